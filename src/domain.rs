use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::DatamakerError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceUrl(Url);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceHost {
    GitHub { owner: String, repo: String },
    Pmr,
}

impl WorkspaceUrl {
    pub fn as_str(&self) -> &str {
        self.0.as_str().trim_end_matches('/')
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    pub fn host(&self) -> WorkspaceHost {
        let host = self.0.host_str().unwrap_or_default();
        if host == "github.com" || host.ends_with(".github.com") {
            let mut segments = self
                .0
                .path_segments()
                .map(|segments| segments.filter(|s| !s.is_empty()).collect::<Vec<_>>())
                .unwrap_or_default()
                .into_iter();
            if let (Some(owner), Some(repo)) = (segments.next(), segments.next()) {
                return WorkspaceHost::GitHub {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                };
            }
        }
        WorkspaceHost::Pmr
    }
}

impl fmt::Display for WorkspaceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WorkspaceUrl {
    type Err = DatamakerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim().trim_end_matches('/');
        let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
        let url =
            Url::parse(trimmed).map_err(|_| DatamakerError::InvalidWorkspace(value.to_string()))?;
        let is_valid = matches!(url.scheme(), "http" | "https")
            && url.host_str().is_some()
            && url.query().is_none()
            && url.fragment().is_none();
        if !is_valid {
            return Err(DatamakerError::InvalidWorkspace(value.to_string()));
        }
        Ok(Self(url))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitId(String);

impl CommitId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CommitId {
    type Err = DatamakerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let is_valid = !normalized.is_empty()
            && !normalized.starts_with('/')
            && !normalized.ends_with('/')
            && !normalized.contains("..")
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/'));
        if !is_valid {
            return Err(DatamakerError::InvalidCommit(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Role a file plays in the flatmap; selects the `files/<role>/` directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryRole {
    Source,
    Image,
    Annotation,
    Connectivity,
    Description,
    Derivative,
}

impl EntryRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryRole::Source => "source",
            EntryRole::Image => "image",
            EntryRole::Annotation => "annotation",
            EntryRole::Connectivity => "connectivity",
            EntryRole::Description => "description",
            EntryRole::Derivative => "derivative",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            EntryRole::Source => "flatmap source",
            EntryRole::Image => "flatmap image",
            EntryRole::Annotation => "flatmap annotation",
            EntryRole::Connectivity => "flatmap connectivity",
            EntryRole::Description => "flatmap dataset description",
            EntryRole::Derivative => "derivative file loaded by map server",
        }
    }
}

impl fmt::Display for EntryRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `major.minor.patch` dataset description schema version, ordered numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SchemaVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SchemaVersion {
    type Err = DatamakerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let re = Regex::new(r"^(\d+)\.(\d+)\.(\d+)$")
            .map_err(|err| DatamakerError::InvalidVersion(err.to_string()))?;
        let caps = re
            .captures(value.trim())
            .ok_or_else(|| DatamakerError::InvalidVersion(value.to_string()))?;
        let part = |index: usize| {
            caps[index]
                .parse::<u32>()
                .map_err(|_| DatamakerError::InvalidVersion(value.to_string()))
        };
        Ok(Self::new(part(1)?, part(2)?, part(3)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionSelector {
    #[default]
    Latest,
    Explicit(SchemaVersion),
}

impl VersionSelector {
    pub fn from_option(value: Option<&str>) -> Result<Self, DatamakerError> {
        match value.map(str::trim) {
            None | Some("") => Ok(VersionSelector::Latest),
            Some(value) => value.parse(),
        }
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSelector::Latest => f.write_str("latest"),
            VersionSelector::Explicit(version) => write!(f, "{version}"),
        }
    }
}

impl FromStr for VersionSelector {
    type Err = DatamakerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().eq_ignore_ascii_case("latest") {
            return Ok(VersionSelector::Latest);
        }
        // A selector that is not a version triple names no known template.
        value
            .trim()
            .parse()
            .map(VersionSelector::Explicit)
            .map_err(|_| DatamakerError::UnknownVersion(value.trim().to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IdType {
    #[default]
    Url,
    Uuid,
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdType::Url => write!(f, "URL"),
            IdType::Uuid => write!(f, "UUID"),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn workspace_url_strips_git_suffix() {
        let ws: WorkspaceUrl = "https://github.com/dbrnz/flatmap-sources.git".parse().unwrap();
        assert_eq!(ws.as_str(), "https://github.com/dbrnz/flatmap-sources");
        assert_eq!(
            ws.host(),
            WorkspaceHost::GitHub {
                owner: "dbrnz".to_string(),
                repo: "flatmap-sources".to_string(),
            }
        );
    }

    #[test]
    fn workspace_url_rejects_non_http() {
        let err = "git@github.com:dbrnz/x.git".parse::<WorkspaceUrl>().unwrap_err();
        assert_matches!(err, DatamakerError::InvalidWorkspace(_));
    }

    #[test]
    fn commit_rejects_traversal() {
        let err = "../HEAD".parse::<CommitId>().unwrap_err();
        assert_matches!(err, DatamakerError::InvalidCommit(_));
    }

    #[test]
    fn schema_versions_order_numerically() {
        let small: SchemaVersion = "2.9.0".parse().unwrap();
        let large: SchemaVersion = "2.10.0".parse().unwrap();
        assert!(large > small);
    }

    #[test]
    fn empty_version_means_latest() {
        assert_eq!(
            VersionSelector::from_option(Some("")).unwrap(),
            VersionSelector::Latest
        );
        assert_eq!(
            VersionSelector::from_option(None).unwrap(),
            VersionSelector::Latest
        );
    }
}
