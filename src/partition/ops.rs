//! Codec-backed partition primitives. Every primitive re-reads the table
//! from the device before acting: the device is the source of truth, and no
//! in-memory table outlives a single read-modify-write.

use anyhow::{bail, Context as _, Result};

use crate::error::Error;
use crate::partition::table;
use crate::tools::PartitionTool;

/// Smallest footprint a partition is shrunk to, in sectors. 2 MiB keeps the
/// next partition's natural start 4 KiB aligned.
pub const MIN_PARTITION_SECTORS: u64 = 4096;

/// Device node name of partition `num` on `disk`. Disks whose name ends in
/// a digit (nvme0n1, loop0) take a "p" separator.
pub fn partition_name(disk: &str, num: u32) -> String {
    if disk.ends_with(|c: char| c.is_ascii_digit()) {
        format!("{disk}p{num}")
    } else {
        format!("{disk}{num}")
    }
}

/// Where to move a partition: to an absolute sector, or by a distance
/// relative to its current start.
#[derive(Debug, Clone, Copy)]
pub enum MoveTarget {
    Absolute(u64),
    Forward(u64),
    Backward(u64),
}

pub async fn read_start(tool: &dyn PartitionTool, disk: &str, num: u32) -> Result<u64> {
    let name = partition_name(disk, num);
    let dump = tool.dump(disk).await?;
    Ok(table::read_entry(&dump, &name)
        .with_context(|| format!("Failed to read start of {name}"))?
        .start)
}

pub async fn read_size(tool: &dyn PartitionTool, disk: &str, num: u32) -> Result<u64> {
    let name = partition_name(disk, num);
    let dump = tool.dump(disk).await?;
    Ok(table::read_entry(&dump, &name)
        .with_context(|| format!("Failed to read size of {name}"))?
        .size)
}

/// Rewrites the entry's start sector. Only the table changes; the data of
/// the partition is not copied (the filesystem is expected to be recreated
/// or repaired by whoever owns the partition's contents).
pub async fn move_partition(
    tool: &dyn PartitionTool,
    disk: &str,
    num: u32,
    target: MoveTarget,
) -> Result<()> {
    let name = partition_name(disk, num);
    let dump = tool.dump(disk).await?;
    let current = table::read_entry(&dump, &name)
        .with_context(|| format!("Failed to move {name} ({target:?})"))?;

    let new_start = match target {
        MoveTarget::Absolute(sector) => sector,
        MoveTarget::Forward(sectors) => current
            .start
            .checked_add(sectors)
            .with_context(|| format!("Moving {name} forward by {sectors} sectors overflows"))?,
        MoveTarget::Backward(sectors) => current.start.checked_sub(sectors).with_context(|| {
            format!("Moving {name} backward by {sectors} sectors crosses sector 0")
        })?,
    };

    let patched = table::parse_and_mutate(&dump, &name, true, |p| p.start = new_start)?;
    tool.apply(disk, &patched)
        .await
        .with_context(|| format!("Failed to move {name} to sector {new_start}"))
}

/// Grows (or shrinks) the entry so its last sector is exactly `end_sector`,
/// keeping the start in place.
pub async fn extend_partition(
    tool: &dyn PartitionTool,
    disk: &str,
    num: u32,
    end_sector: u64,
) -> Result<()> {
    let name = partition_name(disk, num);
    let dump = tool.dump(disk).await?;
    let current = table::read_entry(&dump, &name)
        .with_context(|| format!("Failed to extend {name} to sector {end_sector}"))?;

    if end_sector < current.start {
        bail!(Error::InvalidArgument(format!(
            "new end sector {end_sector} of {name} is before its start sector {}",
            current.start
        )))
    }

    let patched = table::parse_and_mutate(&dump, &name, true, |p| {
        p.size = end_sector - p.start + 1;
    })?;
    tool.apply(disk, &patched)
        .await
        .with_context(|| format!("Failed to extend {name} to sector {end_sector}"))
}

/// Shrinks the entry to [`MIN_PARTITION_SECTORS`], preserving its start, and
/// returns the first sector freed for subsequent allocation.
pub async fn minimize_partition(tool: &dyn PartitionTool, disk: &str, num: u32) -> Result<u64> {
    let name = partition_name(disk, num);
    let dump = tool.dump(disk).await?;

    let mut start = 0;
    let patched = table::parse_and_mutate(&dump, &name, true, |p| {
        start = p.start;
        p.size = MIN_PARTITION_SECTORS;
    })
    .with_context(|| format!("Failed to minimize {name}"))?;

    tool.apply(disk, &patched)
        .await
        .with_context(|| format!("Failed to minimize {name}"))?;
    tracing::info!("Minimized {name} to {MIN_PARTITION_SECTORS} sectors");

    Ok(start + MIN_PARTITION_SECTORS)
}
