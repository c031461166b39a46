use anyhow::{Context, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Collection token the downloader uses when the source is not a playlist.
pub const NO_COLLECTION: &str = "NA";

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create dir {}", path.display()))?;
    Ok(())
}

/// Splits a downloaded file path into its collection folder and file name,
/// relative to the temporary download root. Files directly under the root
/// belong to [`NO_COLLECTION`].
pub fn split_download_path(root: &Path, path: &Path) -> Result<(String, String)> {
    let relative = strip_root(root, path)
        .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;
    let filename = relative
        .file_name()
        .context("download path has no file name")?
        .to_string_lossy()
        .into_owned();
    let collection = match relative.parent().map(first_component) {
        Some(Some(name)) => name,
        _ => NO_COLLECTION.to_string(),
    };
    Ok((collection, filename))
}

/// Every regular file directly inside `dir`, sorted by name.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

pub fn remove_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    fs::remove_dir_all(path).with_context(|| format!("remove dir {}", path.display()))?;
    Ok(())
}

fn strip_root<'a>(root: &Path, path: &'a Path) -> Option<&'a Path> {
    if let Ok(relative) = path.strip_prefix(root) {
        return Some(relative);
    }
    // notify reports absolute paths while the root may be relative.
    let root = fs::canonicalize(root).ok()?;
    let parent = path.parent().and_then(|parent| fs::canonicalize(parent).ok())?;
    let depth = parent.strip_prefix(&root).ok()?.components().count();
    let skip = path.components().count().checked_sub(depth + 1)?;
    let mut components = path.components();
    for _ in 0..skip {
        components.next();
    }
    Some(components.as_path())
}

fn first_component(path: &Path) -> Option<String> {
    path.components().find_map(|component| match component {
        Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
        _ => None,
    })
}
