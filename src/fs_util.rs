use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::warn;
use zip::ZipArchive;

use crate::archive::{LISTING_PATH, Listing};
use crate::error::DatamakerError;

fn open_zip(zip_path: &Path) -> Result<ZipArchive<fs::File>, DatamakerError> {
    let file = fs::File::open(zip_path).map_err(|err| {
        DatamakerError::Filesystem(format!("open zip {}: {err}", zip_path.display()))
    })?;
    ZipArchive::new(file).map_err(|err| DatamakerError::Filesystem(err.to_string()))
}

/// Entry names in the order they were written.
pub fn zip_entry_names(zip_path: &Path) -> Result<Vec<String>, DatamakerError> {
    let mut archive = open_zip(zip_path)?;
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|err| DatamakerError::Filesystem(err.to_string()))?;
        names.push(entry.name().to_string());
    }
    Ok(names)
}

pub fn read_zip_entry(zip_path: &Path, name: &str) -> Result<Vec<u8>, DatamakerError> {
    let mut archive = open_zip(zip_path)?;
    let mut entry = archive
        .by_name(name)
        .map_err(|err| DatamakerError::Filesystem(format!("{name}: {err}")))?;
    let mut bytes = Vec::new();
    entry
        .read_to_end(&mut bytes)
        .map_err(|err| DatamakerError::Filesystem(err.to_string()))?;
    Ok(bytes)
}

pub fn read_listing(zip_path: &Path) -> Result<Listing, DatamakerError> {
    Listing::parse(&read_zip_entry(zip_path, LISTING_PATH)?)
}

/// Decompresses every entry to check the archive's integrity.
pub fn validate_zip(zip_path: &Path) -> Result<(), DatamakerError> {
    let mut archive = open_zip(zip_path)?;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| DatamakerError::Filesystem(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        io::copy(&mut entry, &mut io::sink())
            .map_err(|err| DatamakerError::Filesystem(err.to_string()))?;
    }
    Ok(())
}

/// Regular files under `root` as `(relative path, full path)`, sorted, with
/// hidden entries and symbolic links left out.
pub fn visible_files(root: &Path) -> Result<Vec<(String, PathBuf)>, DatamakerError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = fs::read_dir(&path).map_err(|err| {
            DatamakerError::Filesystem(format!("read {}: {err}", path.display()))
        })?;
        for entry in entries {
            let entry = entry.map_err(|err| DatamakerError::Filesystem(err.to_string()))?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let path = entry.path();
            let file_type = entry.file_type().map_err(|err| {
                DatamakerError::Filesystem(format!("stat {}: {err}", path.display()))
            })?;
            if file_type.is_symlink() {
                warn!(path = %path.display(), "skipping symbolic link");
                continue;
            }
            if file_type.is_dir() {
                stack.push(path);
                continue;
            }
            let relative = path
                .strip_prefix(root)
                .map_err(|err| DatamakerError::Filesystem(err.to_string()))?
                .components()
                .map(|part| part.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            items.push((relative, path));
        }
    }
    items.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visible_files_skips_hidden_entries() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp.path().join("tiles/0")).unwrap();
        fs::create_dir_all(temp.path().join(".git")).unwrap();
        fs::write(temp.path().join("index.json"), b"{}").unwrap();
        fs::write(temp.path().join(".DS_Store"), b"").unwrap();
        fs::write(temp.path().join(".git/HEAD"), b"ref").unwrap();
        fs::write(temp.path().join("tiles/0/0.png"), b"png").unwrap();

        let files = visible_files(temp.path())
            .unwrap()
            .into_iter()
            .map(|(relative, _)| relative)
            .collect::<Vec<_>>();
        assert_eq!(files, vec!["index.json", "tiles/0/0.png"]);
    }

    #[cfg(unix)]
    #[test]
    fn visible_files_skips_symlinks() {
        let temp = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), b"secret").unwrap();
        fs::write(temp.path().join("index.json"), b"{}").unwrap();
        std::os::unix::fs::symlink(temp.path(), temp.path().join("loop")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.txt"),
            temp.path().join("secret.txt"),
        )
        .unwrap();

        let files = visible_files(temp.path())
            .unwrap()
            .into_iter()
            .map(|(relative, _)| relative)
            .collect::<Vec<_>>();
        assert_eq!(files, vec!["index.json"]);
    }
}
