//! Export command implementation.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::{is_stdio, ConnectionArgs};

/// Run the export command.
pub async fn run_export(connection: &ConnectionArgs, output: Option<PathBuf>) -> Result<()> {
    let client = connection.client().await?;

    tracing::info!("starting data export");
    let snapshot = consul_migrate::export(&client)
        .await
        .context("Error exporting data")?;

    let serialized = snapshot
        .to_json_pretty()
        .context("Error serializing exported data")?;

    match output.as_deref() {
        Some(path) if !is_stdio(Some(path)) => {
            write_private(path, serialized.as_bytes())
                .with_context(|| format!("Failed to write data to file {}", path.display()))?;
            tracing::info!(file = %path.display(), "data written to file");
        }
        _ => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(serialized.as_bytes())?;
            stdout.write_all(b"\n")?;
            stdout.flush()?;
        }
    }

    Ok(())
}

/// Snapshots contain token secrets, so the file is only readable by its owner
fn write_private(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}
