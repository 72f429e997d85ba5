//! Turning command-line arguments into a validated batch.

use crate::error::ClientError;
use crate::model::{Size, WorkItem};
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Extensions picked up when a directory is expanded with `--recursive`.
const OPTIMISABLE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "heic", "heif", "tif", "tiff", "bmp", "avif", "mp4",
    "mov", "m4v", "mkv", "webm", "avi", "pdf",
];

fn size_regex() -> &'static Regex {
    static SIZE: OnceLock<Regex> = OnceLock::new();
    SIZE.get_or_init(|| Regex::new(r"^\s*(\d+)\s*[xX×]\s*(\d+)\s*$").expect("valid size pattern"))
}

/// Parse a crop target: `WIDTHxHEIGHT` (also `X` or `×`) or a single number
/// for a square.
pub fn parse_crop(raw: &str) -> Result<Size, ClientError> {
    let invalid = || ClientError::validation(format!("Invalid crop size: {raw}"));
    let size = if let Some(caps) = size_regex().captures(raw) {
        let width = caps[1].parse().map_err(|_| invalid())?;
        let height = caps[2].parse().map_err(|_| invalid())?;
        Size::new(width, height)
    } else {
        Size::square(raw.trim().parse().map_err(|_| invalid())?)
    };
    if size.width == 0 || size.height == 0 {
        return Err(invalid());
    }
    Ok(size)
}

/// Factors must be positive; 1.0 means "no change".
pub fn parse_factor(raw: &str) -> Result<f64, ClientError> {
    match raw.trim().parse::<f64>() {
        Ok(f) if f.is_finite() && f > 0.0 => Ok(f),
        _ => Err(ClientError::validation(format!(
            "Invalid factor: {raw} (expected a positive number)"
        ))),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    pub recursive: bool,
    pub skip_errors: bool,
}

/// Resolve raw arguments into work items.
///
/// Anything with a URL scheme is a remote item (`file://` is unwrapped to a
/// path). Local paths are made absolute and must exist unless `skip_errors` is
/// set, in which case missing paths are dropped. Directories are expanded only
/// with `recursive`. Duplicates keep their first position.
pub fn resolve_items(raw: &[String], opts: ResolveOptions) -> Result<Vec<WorkItem>, ClientError> {
    let cwd = std::env::current_dir()?;
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for arg in raw {
        for item in resolve_one(arg, &cwd, opts)? {
            if seen.insert(item.clone()) {
                items.push(item);
            }
        }
    }

    if items.is_empty() {
        return Err(ClientError::validation("No items to optimise"));
    }
    Ok(items)
}

fn resolve_one(arg: &str, cwd: &Path, opts: ResolveOptions) -> Result<Vec<WorkItem>, ClientError> {
    let path = match arg.split_once("://") {
        Some(("file", rest)) => PathBuf::from(rest),
        Some((scheme, rest))
            if !rest.is_empty() && !scheme.is_empty() && scheme.chars().all(is_scheme_char) =>
        {
            return Ok(vec![WorkItem::remote(arg)]);
        }
        _ => PathBuf::from(arg),
    };
    let path = if path.is_absolute() { path } else { cwd.join(path) };

    if path.is_dir() {
        if !opts.recursive {
            return reject(
                opts,
                format!("{} is a directory (use --recursive to expand it)", path.display()),
            );
        }
        let mut found = Vec::new();
        walk(&path, &mut found)?;
        found.sort();
        debug!(dir = %path.display(), files = found.len(), "expanded directory");
        return Ok(found.into_iter().map(WorkItem::file).collect());
    }

    if !path.exists() {
        return reject(opts, format!("File {} does not exist", path.display()));
    }
    Ok(vec![WorkItem::file(path)])
}

fn reject(opts: ResolveOptions, message: String) -> Result<Vec<WorkItem>, ClientError> {
    if opts.skip_errors {
        warn!("skipping: {message}");
        Ok(Vec::new())
    } else {
        Err(ClientError::Validation(message))
    }
}

fn is_scheme_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')
}

/// Symlinked directories are not followed, so a link back up the tree cannot loop.
fn walk(dir: &Path, found: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();
        if file_type.is_dir() {
            walk(&path, found)?;
        } else if file_type.is_symlink() && path.is_dir() {
            debug!(link = %path.display(), "not following directory symlink");
        } else if is_optimisable(&path) {
            found.push(path);
        }
    }
    Ok(())
}

fn is_optimisable(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            OPTIMISABLE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}
