use clap::Parser;
use optimise_cli::driver::SessionOutcome;
use optimise_cli::error::{ClientError, EXIT_INTERRUPTED};
use optimise_cli::output::spawn_output_writer;
use optimise_cli::{cli, logging};

#[tokio::main]
async fn main() {
    let args = cli::Cli::parse();
    let (out_tx, out_handle) = spawn_output_writer();
    logging::init(args.verbose, &out_tx);

    let result = cli::run(args, out_tx).await;
    let _ = out_handle.await;

    let code = match result {
        Ok(SessionOutcome::Cancelled { .. }) => EXIT_INTERRUPTED,
        Ok(_) => 0,
        Err(e) => {
            eprintln!("Error: {e:#}");
            e.downcast_ref::<ClientError>().map_or(1, ClientError::exit_code)
        }
    };
    std::process::exit(code);
}
