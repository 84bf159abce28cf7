use anyhow::{Context, Result};
use consul_migrate::Snapshot;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use super::{is_stdio, ConnectionArgs};

/// Source for the snapshot to import
pub enum SnapshotSource {
    FromFile(PathBuf),
    FromStdin,
}

impl SnapshotSource {
    pub fn from_arg(input: Option<PathBuf>) -> Self {
        match input {
            Some(path) if !is_stdio(Some(&path)) => SnapshotSource::FromFile(path),
            _ => SnapshotSource::FromStdin,
        }
    }

    pub fn reader(&self) -> io::Result<Box<dyn BufRead>> {
        match self {
            SnapshotSource::FromFile(path) => {
                let file = File::open(path)?;
                Ok(Box::new(BufReader::new(file)))
            }
            SnapshotSource::FromStdin => Ok(Box::new(BufReader::new(io::stdin()))),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            SnapshotSource::FromFile(path) => path.display().to_string(),
            SnapshotSource::FromStdin => "stdin".to_string(),
        }
    }
}

/// Parse a snapshot from `source`
pub fn read_snapshot(source: &SnapshotSource) -> Result<Snapshot> {
    let reader = source
        .reader()
        .with_context(|| format!("Error reading input from {}", source.describe()))?;
    Snapshot::from_reader(reader)
        .with_context(|| format!("Error deserializing JSON data from {}", source.describe()))
}

/// Run import command
pub async fn run_import(connection: &ConnectionArgs, input: Option<PathBuf>) -> Result<()> {
    let client = connection.client().await?;

    let source = SnapshotSource::from_arg(input);
    let snapshot = read_snapshot(&source)?;
    tracing::info!(
        source = %source.describe(),
        enterprise = snapshot.edition.is_enterprise(),
        namespaces = snapshot.namespaces.len(),
        entities = snapshot.entity_count(),
        "starting data import"
    );

    let report = consul_migrate::import(&client, snapshot)
        .await
        .context("Error importing data")?;

    tracing::info!(
        namespaces = report.namespaces,
        policies = report.policies,
        roles = report.roles,
        tokens = report.tokens,
        anonymous_updates = report.anonymous_updates,
        "successfully imported data"
    );
    Ok(())
}
