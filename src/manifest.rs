use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use url::Url;

use crate::domain::EntryRole;
use crate::error::DatamakerError;

/// The flatmap manifest as written by map authors.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatmapManifest {
    pub id: String,
    pub sources: Vec<ManifestSource>,
    #[serde(default)]
    pub anatomical_map: Option<String>,
    #[serde(default)]
    pub properties: Option<String>,
    #[serde(default)]
    pub connectivity_terms: Option<String>,
    #[serde(default)]
    pub annotation: Option<String>,
    #[serde(default)]
    pub connectivity: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub models: Option<String>,
    #[serde(default, rename = "sckan-version")]
    pub sckan_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestSource {
    #[serde(default)]
    pub id: Option<String>,
    pub href: String,
    #[serde(default)]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file_name: String,
    pub role: EntryRole,
}

impl ManifestEntry {
    pub fn new(file_name: impl Into<String>, role: EntryRole) -> Self {
        Self {
            file_name: file_name.into(),
            role,
        }
    }

    pub fn archive_path(&self) -> String {
        format!("files/{}/{}", self.role, self.file_name)
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedManifest {
    pub manifest: FlatmapManifest,
    pub entries: Vec<ManifestEntry>,
}

impl ResolvedManifest {
    pub fn description_file(&self) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.role == EntryRole::Description)
            .map(|entry| entry.file_name.as_str())
    }

    pub fn species(&self) -> Option<&str> {
        self.manifest.models.as_deref()
    }
}

/// Parses a flatmap manifest into entries, keeping declaration order.
pub fn resolve(manifest_bytes: &[u8]) -> Result<ResolvedManifest, DatamakerError> {
    let value: Value = serde_json::from_slice(manifest_bytes)
        .map_err(|err| DatamakerError::MalformedManifest(err.to_string()))?;
    let keys = value
        .as_object()
        .map(|object| object.keys().cloned().collect::<Vec<_>>())
        .ok_or_else(|| {
            DatamakerError::MalformedManifest("manifest must be a JSON object".to_string())
        })?;
    let manifest: FlatmapManifest = serde_json::from_value(value)
        .map_err(|err| DatamakerError::MalformedManifest(err.to_string()))?;

    if let Some(release) = &manifest.sckan_version {
        if !matches!(release.as_str(), "production" | "staging") {
            return Err(DatamakerError::MalformedManifest(
                "'sckan-version' must be 'production' or 'staging'".to_string(),
            ));
        }
    }

    let mut collector = EntryCollector::default();
    for key in &keys {
        match key.as_str() {
            "sources" => {
                for source in &manifest.sources {
                    let role = match source.kind.as_deref() {
                        Some("image") => EntryRole::Image,
                        _ => EntryRole::Source,
                    };
                    collector.push(&source.href, role)?;
                }
            }
            "anatomicalMap" => collector.push_opt(&manifest.anatomical_map, EntryRole::Annotation)?,
            "properties" => collector.push_opt(&manifest.properties, EntryRole::Annotation)?,
            "connectivityTerms" => {
                collector.push_opt(&manifest.connectivity_terms, EntryRole::Annotation)?
            }
            "annotation" => collector.push_opt(&manifest.annotation, EntryRole::Annotation)?,
            "connectivity" => {
                for path in &manifest.connectivity {
                    collector.push(path, EntryRole::Connectivity)?;
                }
            }
            "description" => collector.push_opt(&manifest.description, EntryRole::Description)?,
            _ => {}
        }
    }

    Ok(ResolvedManifest {
        manifest,
        entries: collector.entries,
    })
}

#[derive(Default)]
struct EntryCollector {
    entries: Vec<ManifestEntry>,
    seen: HashSet<String>,
}

impl EntryCollector {
    fn push_opt(&mut self, path: &Option<String>, role: EntryRole) -> Result<(), DatamakerError> {
        match path {
            Some(path) => self.push(path, role),
            None => Ok(()),
        }
    }

    fn push(&mut self, path: &str, role: EntryRole) -> Result<(), DatamakerError> {
        let Some(file_name) = workspace_path(path)? else {
            warn!(href = path, "skipping flatmap file outside the workspace");
            return Ok(());
        };
        let entry = ManifestEntry::new(file_name, role);
        if !self.seen.insert(entry.archive_path()) {
            return Err(DatamakerError::MalformedManifest(format!(
                "{path} is listed more than once as {role}"
            )));
        }
        self.entries.push(entry);
        Ok(())
    }
}

/// Normalises a manifest path relative to the workspace root. Paths with a
/// URL scheme are external and yield `None`.
pub fn workspace_path(path: &str) -> Result<Option<String>, DatamakerError> {
    let trimmed = path.trim();
    if Url::parse(trimmed).is_ok() {
        return Ok(None);
    }
    let mut normalized = trimmed;
    while let Some(rest) = normalized.strip_prefix("./") {
        normalized = rest;
    }
    let escapes = normalized
        .split('/')
        .any(|segment| segment == ".." || segment.is_empty());
    if normalized.is_empty() || normalized.starts_with('/') || escapes {
        return Err(DatamakerError::MalformedManifest(format!(
            "file paths must be relative to the workspace: {path}"
        )));
    }
    Ok(Some(normalized.to_string()))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn entries_follow_declaration_order() {
        let manifest = br#"{
            "id": "rat",
            "annotation": "b.json",
            "sources": [{"id": "rat", "href": "a.svg", "kind": "base"}],
            "connectivity": ["c1.json", "c2.json"]
        }"#;
        let resolved = resolve(manifest).unwrap();
        let paths = resolved
            .entries
            .iter()
            .map(ManifestEntry::archive_path)
            .collect::<Vec<_>>();
        assert_eq!(
            paths,
            vec![
                "files/annotation/b.json",
                "files/source/a.svg",
                "files/connectivity/c1.json",
                "files/connectivity/c2.json",
            ]
        );
    }

    #[test]
    fn external_sources_are_skipped() {
        let manifest = br#"{
            "id": "rat",
            "sources": [
                {"href": "https://example.org/remote.svg", "kind": "base"},
                {"href": "./local/details.svg", "kind": "details"},
                {"href": "slide.png", "kind": "image"}
            ]
        }"#;
        let resolved = resolve(manifest).unwrap();
        assert_eq!(
            resolved.entries,
            vec![
                ManifestEntry::new("local/details.svg", EntryRole::Source),
                ManifestEntry::new("slide.png", EntryRole::Image),
            ]
        );
    }

    #[test]
    fn missing_sources_is_malformed() {
        let err = resolve(br#"{"id": "rat"}"#).unwrap_err();
        assert_matches!(err, DatamakerError::MalformedManifest(_));
    }

    #[test]
    fn source_without_href_is_malformed() {
        let err = resolve(br#"{"id": "rat", "sources": [{"id": "x"}]}"#).unwrap_err();
        assert_matches!(err, DatamakerError::MalformedManifest(_));
    }

    #[test]
    fn invalid_sckan_release_is_malformed() {
        let err = resolve(br#"{"id": "rat", "sources": [], "sckan-version": "nightly"}"#)
            .unwrap_err();
        assert_matches!(err, DatamakerError::MalformedManifest(_));
    }

    #[test]
    fn duplicate_paths_are_rejected() {
        let err = resolve(
            br#"{"id": "rat", "sources": [{"href": "a.svg"}, {"href": "./a.svg"}]}"#,
        )
        .unwrap_err();
        assert_matches!(err, DatamakerError::MalformedManifest(_));
    }

    #[test]
    fn parent_paths_are_rejected() {
        assert_matches!(
            workspace_path("../secrets.json"),
            Err(DatamakerError::MalformedManifest(_))
        );
        assert_matches!(
            workspace_path("/etc/passwd"),
            Err(DatamakerError::MalformedManifest(_))
        );
    }
}
