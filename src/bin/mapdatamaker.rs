use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use mapdatamaker::app::{App, AssembleRequest};
use mapdatamaker::config::ConfigLoader;
use mapdatamaker::domain::{CommitId, IdType, VersionSelector, WorkspaceUrl};
use mapdatamaker::error::DatamakerError;
use mapdatamaker::output::{JsonOutput, LogOutput, OutputMode};
use mapdatamaker::workspace::WorkspaceHttpClient;

#[derive(Parser)]
#[command(name = "mapdatamaker")]
#[command(about = "Create a SPARC dataset of a flatmap's sources held in a PMR or GitHub workspace")]
#[command(version, author)]
struct Cli {
    /// URL of the workspace containing the flatmap manifest
    workspace: String,

    /// Commit of the workspace to package
    commit: String,

    /// Name of the flatmap manifest in the workspace
    manifest: String,

    /// Path of the dataset archive to create
    dataset: Utf8PathBuf,

    /// dataset_description version, e.g. 1.2.3 or 2.1.0 (default: latest)
    #[arg(id = "schema_version", value_name = "VERSION")]
    version: Option<String>,

    /// Identifier of the dataset (default: the workspace URL, or a UUID with --id-type uuid)
    #[arg(long)]
    id: Option<String>,

    #[arg(long, value_enum)]
    id_type: Option<IdType>,

    /// Directory of generated flatmap files to add under files/derivative
    #[arg(long)]
    derivative: Option<PathBuf>,

    /// Description file in the workspace, used when the manifest names none
    #[arg(long)]
    description: Option<String>,

    /// JSON config file (default: ./mapdatamaker.json when present)
    #[arg(long)]
    config: Option<String>,

    /// HTTP timeout in seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<DatamakerError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &DatamakerError) -> u8 {
    match error {
        DatamakerError::NotFound { .. } => 2,
        error if error.is_transport() => 3,
        _ => 1,
    }
}

// Library errors must reach `main` as `DatamakerError`: convert with `?`, not `into_diagnostic`.
fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Summary
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let version = match cli.version.as_deref() {
        Some(value) => VersionSelector::from_option(Some(value))?,
        None => config.default_version,
    };
    let workspace = cli.workspace.parse::<WorkspaceUrl>()?;
    let commit = cli.commit.parse::<CommitId>()?;

    let mut request = AssembleRequest::new(workspace, commit, cli.manifest, version, cli.dataset);
    request.id = cli.id;
    request.id_type = cli.id_type.unwrap_or(config.id_type);
    request.derivative = cli.derivative;
    request.description = cli.description;

    let timeout = Duration::from_secs(cli.timeout.unwrap_or(config.timeout_secs));
    let client = WorkspaceHttpClient::new(timeout)?;
    let app = App::new(client).with_additional_links(config.additional_links);

    match output_mode {
        OutputMode::Json => {
            let result = app.assemble(&request, &JsonOutput)?;
            JsonOutput::print_assemble(&result).into_diagnostic()?;
        }
        OutputMode::Summary => {
            let result = app.assemble(&request, &LogOutput)?;
            LogOutput::print_summary(&result).into_diagnostic()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const POSITIONALS: [&str; 5] = [
        "mapdatamaker",
        "https://example.org/ws/1",
        "abc123",
        "manifest.json",
        "rat.zip",
    ];

    #[test]
    fn zero_timeout_is_rejected() {
        let args = POSITIONALS.iter().copied().chain(["--timeout", "0"]);
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn description_option_is_parsed() {
        let args = POSITIONALS
            .iter()
            .copied()
            .chain(["--description", "description.json", "--timeout", "5"]);
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.description.as_deref(), Some("description.json"));
        assert_eq!(cli.timeout, Some(5));
        assert_eq!(cli.version, None);
    }
}
