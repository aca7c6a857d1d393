use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::archive::{Archive, DESCRIPTION_PATH, LISTING_PATH, Listing, ListingRecord};
use crate::description::{
    AdditionalLink, DatasetIdentity, DescriptionInputs, FlatmapDescription, SchemaRegistry,
    default_additional_links,
};
use crate::domain::{CommitId, EntryRole, IdType, VersionSelector, WorkspaceUrl};
use crate::error::DatamakerError;
use crate::fs_util::visible_files;
use crate::manifest::{self, ManifestEntry};
use crate::workspace::WorkspaceClient;

#[derive(Debug, Clone)]
pub struct AssembleRequest {
    pub workspace: WorkspaceUrl,
    pub commit: CommitId,
    pub manifest_name: String,
    pub version: VersionSelector,
    pub output: Utf8PathBuf,
    pub id: Option<String>,
    pub id_type: IdType,
    pub derivative: Option<PathBuf>,
    /// Description file to use when the manifest names none.
    pub description: Option<String>,
}

impl AssembleRequest {
    pub fn new(
        workspace: WorkspaceUrl,
        commit: CommitId,
        manifest_name: impl Into<String>,
        version: VersionSelector,
        output: Utf8PathBuf,
    ) -> Self {
        Self {
            workspace,
            commit,
            manifest_name: manifest_name.into(),
            version,
            output,
            id: None,
            id_type: IdType::Url,
            derivative: None,
            description: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssembleResult {
    pub output: String,
    pub schema_version: String,
    pub dataset_id: String,
    pub id_type: String,
    pub source_files: usize,
    pub derivative_files: usize,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<W: WorkspaceClient> {
    workspace: W,
    registry: SchemaRegistry,
    additional_links: Vec<AdditionalLink>,
}

impl<W: WorkspaceClient> App<W> {
    pub fn new(workspace: W) -> Self {
        Self {
            workspace,
            registry: SchemaRegistry::builtin(),
            additional_links: default_additional_links(),
        }
    }

    pub fn with_additional_links(mut self, links: Vec<AdditionalLink>) -> Self {
        self.additional_links = links;
        self
    }

    pub fn assemble(
        &self,
        request: &AssembleRequest,
        sink: &dyn ProgressSink,
    ) -> Result<AssembleResult, DatamakerError> {
        self.assemble_at(request, Utc::now(), sink)
    }

    /// Builds the whole dataset in memory and only touches `request.output`
    /// once every fetch and descriptor has succeeded.
    pub fn assemble_at(
        &self,
        request: &AssembleRequest,
        now: DateTime<Utc>,
        sink: &dyn ProgressSink,
    ) -> Result<AssembleResult, DatamakerError> {
        let start = Instant::now();
        let template = self.registry.resolve(request.version)?;
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; dataset description {}", template.version),
            elapsed: None,
        });

        let manifest_name = manifest::workspace_path(&request.manifest_name)?.ok_or_else(|| {
            DatamakerError::MalformedManifest(format!(
                "manifest must be a file in the workspace: {}",
                request.manifest_name
            ))
        })?;
        sink.event(ProgressEvent {
            message: format!("phase=Fetch; manifest {manifest_name}"),
            elapsed: None,
        });
        let manifest_bytes =
            self.workspace
                .fetch(&request.workspace, &request.commit, &manifest_name)?;
        let resolved = manifest::resolve(&manifest_bytes)?;
        info!(
            manifest = %manifest_name,
            id = %resolved.manifest.id,
            entries = resolved.entries.len(),
            "resolved flatmap manifest"
        );

        let mut archive = Archive::with_timestamp(now);
        let mut records = Vec::new();
        let mut description_bytes = None;
        for entry in &resolved.entries {
            sink.event(ProgressEvent {
                message: format!("phase=Fetch; {} {}", entry.role, entry.file_name),
                elapsed: Some(start.elapsed()),
            });
            let bytes =
                self.workspace
                    .fetch(&request.workspace, &request.commit, &entry.file_name)?;
            if entry.role == EntryRole::Description {
                description_bytes = Some(bytes.clone());
            }
            archive.add(entry.archive_path(), bytes)?;
            records.push(ListingRecord::for_entry(entry, now, resolved.species()));
        }

        let mut derivative_files = 0;
        if let Some(root) = &request.derivative {
            for (relative, path) in visible_files(root)? {
                let entry = ManifestEntry::new(relative, EntryRole::Derivative);
                let read_error = |err: std::io::Error| {
                    DatamakerError::Filesystem(format!("read {}: {err}", path.display()))
                };
                let bytes = fs::read(&path).map_err(read_error)?;
                let modified = fs::metadata(&path)
                    .and_then(|metadata| metadata.modified())
                    .map_err(read_error)?;
                archive.add(entry.archive_path(), bytes)?;
                records.push(ListingRecord::for_entry(
                    &entry,
                    DateTime::<Utc>::from(modified),
                    resolved.species(),
                ));
                derivative_files += 1;
            }
            info!(files = derivative_files, root = %root.display(), "staged derivative files");
        }

        sink.event(ProgressEvent {
            message: "phase=Describe; building dataset description".to_string(),
            elapsed: Some(start.elapsed()),
        });
        let description = match (resolved.description_file(), description_bytes) {
            (Some(file), Some(bytes)) => Some(FlatmapDescription::parse(file, &bytes)?),
            _ => self.requested_description(request)?,
        };
        let identity = DatasetIdentity::resolve(
            request.id.as_deref(),
            request.id_type,
            &request.workspace,
            &request.commit,
            &manifest_bytes,
        );
        let record = template.populate(&DescriptionInputs {
            description,
            identity: identity.clone(),
            additional_links: self.additional_links.clone(),
            number_of_subjects: 0,
            number_of_samples: 0,
            generated_at: now,
        });
        archive.add(DESCRIPTION_PATH, record.to_json_bytes()?)?;
        archive.add(LISTING_PATH, Listing { files: records }.to_json_bytes()?)?;

        sink.event(ProgressEvent {
            message: format!("phase=Store; writing {}", request.output),
            elapsed: Some(start.elapsed()),
        });
        archive.persist(&request.output)?;
        info!(
            output = %request.output,
            entries = archive.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "dataset archive written"
        );

        Ok(AssembleResult {
            output: request.output.to_string(),
            schema_version: template.version.to_string(),
            dataset_id: identity.id,
            id_type: identity.id_type.to_string(),
            source_files: resolved.entries.len(),
            derivative_files,
            paths: archive.paths(),
        })
    }

    fn requested_description(
        &self,
        request: &AssembleRequest,
    ) -> Result<Option<FlatmapDescription>, DatamakerError> {
        let Some(name) = request.description.as_deref() else {
            return Ok(None);
        };
        let file_name = manifest::workspace_path(name)?.ok_or_else(|| {
            DatamakerError::MalformedDescription {
                file: name.to_string(),
                message: "description must be a file in the workspace".to_string(),
            }
        })?;
        let bytes = self
            .workspace
            .fetch(&request.workspace, &request.commit, &file_name)?;
        info!(description = %file_name, "using requested description file");
        FlatmapDescription::parse(&file_name, &bytes).map(Some)
    }
}
