use std::collections::HashSet;
use std::fs;
use std::io::{Seek, Write};

use camino::Utf8Path;
use chrono::{DateTime, Datelike, SecondsFormat, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::domain::EntryRole;
use crate::error::DatamakerError;
use crate::manifest::ManifestEntry;

pub const DESCRIPTION_PATH: &str = "dataset_description.json";
pub const LISTING_PATH: &str = "manifest.json";

#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub path: String,
    pub bytes: Vec<u8>,
}

/// Dataset content staged in memory until the whole run has succeeded.
#[derive(Debug, Default)]
pub struct Archive {
    entries: Vec<ArchiveEntry>,
    paths: HashSet<String>,
    modified: Option<DateTime<Utc>>,
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timestamp(modified: DateTime<Utc>) -> Self {
        Self {
            modified: Some(modified),
            ..Self::default()
        }
    }

    pub fn add(&mut self, path: impl Into<String>, bytes: Vec<u8>) -> Result<(), DatamakerError> {
        let path = path.into();
        if !self.paths.insert(path.clone()) {
            return Err(DatamakerError::Filesystem(format!(
                "duplicate archive path: {path}"
            )));
        }
        debug!(%path, bytes = bytes.len(), "archive.stage");
        self.entries.push(ArchiveEntry { path, bytes });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn paths(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.path.clone()).collect()
    }

    /// Zips into a temporary file beside `output`, then renames it into place
    /// so a failed run never leaves a partial dataset behind.
    pub fn persist(&self, output: &Utf8Path) -> Result<(), DatamakerError> {
        let write_error = |message: String| DatamakerError::Write {
            path: output.to_string(),
            message,
        };
        let parent = match output.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        };
        fs::create_dir_all(parent.as_std_path()).map_err(|err| write_error(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".mapdatamaker")
            .suffix(".zip.tmp")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| write_error(err.to_string()))?;
        self.write_zip(temp.as_file_mut())
            .map_err(|err| write_error(err.to_string()))?;
        temp.as_file()
            .sync_all()
            .map_err(|err| write_error(err.to_string()))?;
        temp.persist(output.as_std_path())
            .map_err(|err| write_error(err.error.to_string()))?;
        Ok(())
    }

    fn write_zip<W: Write + Seek>(&self, writer: W) -> zip::result::ZipResult<W> {
        let mut zip = ZipWriter::new(writer);
        let mut options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        if let Some(modified) = self.modified.and_then(zip_timestamp) {
            options = options.last_modified_time(modified);
        }
        for entry in &self.entries {
            zip.start_file(entry.path.as_str(), options)?;
            zip.write_all(&entry.bytes)?;
        }
        zip.finish()
    }
}

fn zip_timestamp(value: DateTime<Utc>) -> Option<zip::DateTime> {
    let year = u16::try_from(value.year()).ok()?;
    zip::DateTime::from_date_and_time(
        year,
        value.month() as u8,
        value.day() as u8,
        value.hour() as u8,
        value.minute() as u8,
        value.second() as u8,
    )
    .ok()
}

/// The top-level `manifest.json`: one record per archived data file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub files: Vec<ListingRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub filename: String,
    pub timestamp: String,
    pub role: EntryRole,
    pub description: String,
    #[serde(rename = "file type")]
    pub file_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
}

impl ListingRecord {
    /// `timestamp` is the run time for fetched files and the file's
    /// modification time for derivative files.
    pub fn for_entry(
        entry: &ManifestEntry,
        timestamp: DateTime<Utc>,
        species: Option<&str>,
    ) -> Self {
        Self {
            filename: entry.archive_path(),
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            role: entry.role,
            description: entry.role.describe().to_string(),
            file_type: file_type(&entry.file_name),
            species: species.map(str::to_string),
        }
    }

    pub fn entry(&self) -> Option<ManifestEntry> {
        let prefix = format!("files/{}/", self.role);
        self.filename
            .strip_prefix(&prefix)
            .map(|file_name| ManifestEntry::new(file_name, self.role))
    }
}

impl Listing {
    pub fn parse(bytes: &[u8]) -> Result<Self, DatamakerError> {
        serde_json::from_slice(bytes)
            .map_err(|err| DatamakerError::Filesystem(format!("invalid {LISTING_PATH}: {err}")))
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, DatamakerError> {
        serde_json::to_vec_pretty(self).map_err(|err| DatamakerError::Write {
            path: LISTING_PATH.to_string(),
            message: err.to_string(),
        })
    }

    pub fn entries(&self) -> Vec<ManifestEntry> {
        self.files
            .iter()
            .filter_map(ListingRecord::entry)
            .collect()
    }
}

/// MIME type when known, otherwise the file extension.
pub fn file_type(file_name: &str) -> String {
    match mime_guess::from_path(file_name).first() {
        Some(mime) => mime.essence_str().to_string(),
        None => file_name
            .rsplit_once('.')
            .map(|(_, ext)| format!(".{ext}"))
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn duplicate_paths_are_rejected() {
        let mut archive = Archive::new();
        archive.add("files/source/a.svg", b"<svg/>".to_vec()).unwrap();
        let err = archive
            .add("files/source/a.svg", b"<svg/>".to_vec())
            .unwrap_err();
        assert_matches!(err, DatamakerError::Filesystem(_));
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn listing_record_maps_back_to_entry() {
        let entry = ManifestEntry::new("maps/b.json", EntryRole::Annotation);
        let modified = Utc.with_ymd_and_hms(2023, 11, 2, 8, 15, 0).unwrap();
        let record = ListingRecord::for_entry(&entry, modified, Some("NCBITaxon:10114"));
        assert_eq!(record.filename, "files/annotation/maps/b.json");
        assert_eq!(record.timestamp, "2023-11-02T08:15:00Z");
        assert_eq!(record.file_type, "application/json");
        assert_eq!(record.entry(), Some(entry));
    }

    #[test]
    fn unknown_extension_falls_back_to_suffix() {
        assert_eq!(file_type("layers.zzqx"), ".zzqx");
        assert_eq!(file_type("README"), "");
    }

    #[test]
    fn persist_leaves_no_temp_files() {
        let temp = tempfile::tempdir().unwrap();
        let output = camino::Utf8PathBuf::from_path_buf(temp.path().join("out/dataset.zip")).unwrap();
        let mut archive = Archive::new();
        archive.add(LISTING_PATH, b"{\"files\":[]}".to_vec()).unwrap();
        archive.persist(&output).unwrap();

        let names = fs::read_dir(temp.path().join("out"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["dataset.zip".to_string()]);
    }
}
