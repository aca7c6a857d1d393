use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;
use url::Url;

use crate::domain::{CommitId, WorkspaceHost, WorkspaceUrl};
use crate::error::DatamakerError;

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Retrieves files from a workspace as of a given commit.
pub trait WorkspaceClient {
    fn fetch(
        &self,
        workspace: &WorkspaceUrl,
        commit: &CommitId,
        file_name: &str,
    ) -> Result<Vec<u8>, DatamakerError>;
}

#[derive(Clone)]
pub struct WorkspaceHttpClient {
    client: Client,
}

impl WorkspaceHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, DatamakerError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("mapdatamaker/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| DatamakerError::Transport(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| DatamakerError::Transport(err.to_string()))?;
        Ok(Self { client })
    }

    /// GitHub serves raw files under `/raw/<commit>/`; PMR under `/rawfile/<commit>/`.
    /// Each path segment is percent-encoded, so `#` and `?` stay part of the file name.
    pub fn raw_file_url(
        workspace: &WorkspaceUrl,
        commit: &CommitId,
        file_name: &str,
    ) -> Result<Url, DatamakerError> {
        let file_name = file_name.trim_start_matches("./");
        let (mut url, prefix) = match workspace.host() {
            WorkspaceHost::GitHub { owner, repo } => {
                let base = Url::parse("https://github.com")
                    .map_err(|err| DatamakerError::InvalidWorkspace(err.to_string()))?;
                (base, vec![owner, repo, "raw".to_string()])
            }
            WorkspaceHost::Pmr => (workspace.url().clone(), vec!["rawfile".to_string()]),
        };
        url.path_segments_mut()
            .map_err(|_| DatamakerError::InvalidWorkspace(workspace.to_string()))?
            .pop_if_empty()
            .extend(prefix)
            .extend(commit.as_str().split('/'))
            .extend(file_name.split('/'));
        Ok(url)
    }

    fn handle_status(
        url: &str,
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, DatamakerError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(DatamakerError::NotFound {
                url: url.to_string(),
            });
        }
        let message = response
            .text()
            .ok()
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| format!("request for {url} failed"));
        Err(DatamakerError::TransportStatus {
            status: status.as_u16(),
            message,
        })
    }
}

impl WorkspaceClient for WorkspaceHttpClient {
    fn fetch(
        &self,
        workspace: &WorkspaceUrl,
        commit: &CommitId,
        file_name: &str,
    ) -> Result<Vec<u8>, DatamakerError> {
        let url = Self::raw_file_url(workspace, commit, file_name)?;
        debug!(%url, "workspace.request");
        let start = Instant::now();
        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|err| DatamakerError::Transport(err.to_string()))?;
        let response = Self::handle_status(url.as_str(), response)?;
        let bytes = response
            .bytes()
            .map_err(|err| DatamakerError::Transport(err.to_string()))?;
        debug!(
            %url,
            bytes = bytes.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "workspace.response"
        );
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pmr_raw_file_url() {
        let ws: WorkspaceUrl = "https://models.physiomeproject.org/workspace/a1b/"
            .parse()
            .unwrap();
        let commit: CommitId = "abc123".parse().unwrap();
        assert_eq!(
            WorkspaceHttpClient::raw_file_url(&ws, &commit, "manifest.json")
                .unwrap()
                .as_str(),
            "https://models.physiomeproject.org/workspace/a1b/rawfile/abc123/manifest.json"
        );
    }

    #[test]
    fn github_raw_file_url() {
        let ws: WorkspaceUrl = "https://github.com/dbrnz/rat-flatmap.git".parse().unwrap();
        let commit: CommitId = "0f1e2d".parse().unwrap();
        assert_eq!(
            WorkspaceHttpClient::raw_file_url(&ws, &commit, "./sources/rat.svg")
                .unwrap()
                .as_str(),
            "https://github.com/dbrnz/rat-flatmap/raw/0f1e2d/sources/rat.svg"
        );
    }

    #[test]
    fn reserved_characters_stay_in_file_name() {
        let ws: WorkspaceUrl = "https://models.physiomeproject.org/workspace/a1b"
            .parse()
            .unwrap();
        let commit: CommitId = "abc".parse().unwrap();

        let url = WorkspaceHttpClient::raw_file_url(&ws, &commit, "maps/rat#2.svg").unwrap();
        assert_eq!(url.path(), "/workspace/a1b/rawfile/abc/maps/rat%232.svg");
        assert_eq!(url.fragment(), None);

        let url = WorkspaceHttpClient::raw_file_url(&ws, &commit, "maps/what?.svg").unwrap();
        assert_eq!(url.path(), "/workspace/a1b/rawfile/abc/maps/what%3F.svg");
        assert_eq!(url.query(), None);
    }
}
