//! Narrow seams over the external tools so the layout and sealing logic can
//! be exercised against textual fixtures instead of real subprocesses.

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use tokio::process::Command;

use crate::error::Error;
use crate::fs::cmd::CheckCommandOutput as _;

/// Read and write access to a disk's partition table, in sfdisk dump form.
#[async_trait]
pub trait PartitionTool: Send + Sync {
    /// Fetches the current dump of the disk's partition table.
    async fn dump(&self, disk: &str) -> Result<String>;

    /// Re-applies a (mutated) dump to the disk.
    async fn apply(&self, disk: &str, table: &str) -> Result<()>;
}

pub struct Sfdisk;

#[async_trait]
impl PartitionTool for Sfdisk {
    async fn dump(&self, disk: &str) -> Result<String> {
        let stdout = Command::new("sfdisk")
            .arg("--dump")
            .arg(disk)
            .run()
            .await
            .with_context(|| format!("Failed to dump partition table of {disk}"))?;
        String::from_utf8(stdout).map_err(|_| {
            Error::UnexpectedToolOutput {
                tool: "sfdisk",
                reason: format!("non-UTF-8 partition table dump of {disk}"),
            }
            .into()
        })
    }

    async fn apply(&self, disk: &str, table: &str) -> Result<()> {
        Command::new("sfdisk")
            .arg("--no-reread")
            .arg("--force")
            .arg(disk)
            .run_with_input(table.as_bytes())
            .await
            .map(drop)
            .context(Error::TableWriteFailed(disk.to_string()))
    }
}

/// Builds a dm-verity hash tree and returns the tool's textual report.
#[async_trait]
pub trait HashTreeBuilder: Send + Sync {
    async fn format(
        &self,
        data_dev: &str,
        hash_dev: &str,
        data_blocks: u64,
        hash_offset: u64,
    ) -> Result<String>;
}

pub struct Veritysetup;

#[async_trait]
impl HashTreeBuilder for Veritysetup {
    async fn format(
        &self,
        data_dev: &str,
        hash_dev: &str,
        data_blocks: u64,
        hash_offset: u64,
    ) -> Result<String> {
        let stdout = Command::new("veritysetup")
            .arg("format")
            .arg(data_dev)
            .arg(hash_dev)
            .arg("--data-block-size=4096")
            .arg("--hash-block-size=4096")
            .arg(format!("--data-blocks={data_blocks}"))
            .arg(format!("--hash-offset={hash_offset}"))
            .arg("--no-superblock")
            .arg("--format=0")
            .run()
            .await
            .context(Error::SealToolFailed(data_dev.to_string()))?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

/// Lists block device attributes, one blkid-style line per device.
#[async_trait]
pub trait BlockAttrs: Send + Sync {
    async fn list(&self) -> Result<String>;
}

pub struct Blkid;

#[async_trait]
impl BlockAttrs for Blkid {
    async fn list(&self) -> Result<String> {
        let stdout = Command::new("blkid")
            .run()
            .await
            .context("Failed to list block device attributes")?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}
