//! The two disk layout reorganization policies.
//!
//! Both grow the OEM partition by moving the stateful partition out of the
//! way first, then sliding the OEM partition into the vacated space and
//! extending it. The move-the-neighbor step must come before the
//! move-the-target step: reversing them would place two entries over the
//! same sector range mid-sequence, which sfdisk rejects.
//!
//! The sequence is not transactional. Every step is a single table
//! rewrite against the freshly re-read table, so a failure leaves the disk
//! at a well-defined intermediate state named by the error chain, and the
//! whole operation can be retried by the caller.

use anyhow::{bail, Context as _, Result};

use crate::error::Error;
use crate::partition::ops::{self, MoveTarget};
use crate::partition::size::{parse_size, SECTOR_SIZE};
use crate::tools::PartitionTool;

fn check_args(disk: &str, state_part: u32, oem_part: u32) -> Result<()> {
    if disk.is_empty() || state_part == 0 || oem_part == 0 {
        bail!(Error::InvalidArgument(format!(
            "disk={disk:?}, state_partition={state_part}, oem_partition={oem_part}"
        )))
    }
    Ok(())
}

/// Grows the OEM partition (which sits immediately before the stateful
/// partition) to `oem_size`:
///
/// 1. no-op with a warning if `oem_size` is not larger than the current size
/// 2. move the stateful partition forward by `oem_size`
/// 3. move the OEM partition to the stateful partition's original start
/// 4. extend the OEM partition to one sector before the stateful
///    partition's new start
///
/// Returns the OEM partition's final size in sectors, which the sealing
/// stage consumes.
pub async fn extend_oem_partition(
    tool: &dyn PartitionTool,
    disk: &str,
    state_part: u32,
    oem_part: u32,
    oem_size: &str,
) -> Result<u64> {
    check_args(disk, state_part, oem_part)?;
    let params = || {
        format!(
            "disk={disk:?}, state_partition={state_part}, oem_partition={oem_part}, oem_size={oem_size:?}"
        )
    };

    let new_size = parse_size(oem_size).with_context(params)?;
    let old_size_sectors = ops::read_size(tool, disk, oem_part)
        .await
        .with_context(params)?;

    if new_size.to_bytes() <= old_size_sectors * SECTOR_SIZE {
        tracing::warn!(
            "Requested OEM size of {} bytes is not larger than the current {} bytes, nothing is done ({})",
            new_size.to_bytes(),
            old_size_sectors * SECTOR_SIZE,
            params()
        );
        return Ok(old_size_sectors);
    }

    let table = tool.dump(disk).await.with_context(params)?;
    tracing::info!("Old partition table:\n{table}");

    let old_state_start = ops::read_start(tool, disk, state_part)
        .await
        .with_context(params)?;

    ops::move_partition(tool, disk, state_part, MoveTarget::Forward(new_size.to_sectors()))
        .await
        .with_context(params)?;

    let new_state_start = ops::read_start(tool, disk, state_part)
        .await
        .with_context(params)?;

    ops::move_partition(tool, disk, oem_part, MoveTarget::Absolute(old_state_start))
        .await
        .with_context(params)?;

    ops::extend_partition(tool, disk, oem_part, new_state_start - 1)
        .await
        .with_context(params)?;

    let table = tool.dump(disk).await.with_context(params)?;
    tracing::info!("Completed extending the OEM partition.\nNew partition table:\n{table}");

    ops::read_size(tool, disk, oem_part).await.with_context(params)
}

/// Superset of [`extend_oem_partition`] that can first shrink the root
/// partition to its minimum footprint and reuse the freed space as the new
/// start point of the `OEM | stateful` pair. Without `reclaim_root` the
/// start point is the stateful partition's current start and the behavior
/// matches [`extend_oem_partition`].
pub async fn reorganize_disk(
    tool: &dyn PartitionTool,
    disk: &str,
    state_part: u32,
    oem_part: u32,
    root_part: u32,
    oem_size: &str,
    reclaim_root: bool,
) -> Result<()> {
    check_args(disk, state_part, oem_part)?;
    if oem_size.is_empty() {
        bail!(Error::InvalidArgument(format!(
            "empty oem_size (disk={disk:?}, state_partition={state_part}, oem_partition={oem_part})"
        )))
    }
    let params = || {
        format!(
            "disk={disk:?}, state_partition={state_part}, oem_partition={oem_part}, \
             root_partition={root_part}, oem_size={oem_size:?}, reclaim_root={reclaim_root}"
        )
    };

    let table = tool.dump(disk).await.with_context(params)?;
    tracing::info!("Old partition table:\n{table}");

    let new_size = parse_size(oem_size).with_context(params)?;
    let old_size_sectors = ops::read_size(tool, disk, oem_part)
        .await
        .with_context(params)?;

    let start_point = if reclaim_root {
        ops::minimize_partition(tool, disk, root_part)
            .await
            .with_context(params)?
    } else {
        ops::read_start(tool, disk, state_part)
            .await
            .with_context(params)?
    };

    if new_size.to_bytes() <= old_size_sectors * SECTOR_SIZE {
        if new_size.to_bytes() != 0 {
            tracing::warn!(
                "Requested OEM size of {} bytes is not larger than the current {} bytes, \
                 nothing is done for the OEM partition ({})",
                new_size.to_bytes(),
                old_size_sectors * SECTOR_SIZE,
                params()
            );
        }
        if !reclaim_root {
            return Ok(());
        }
        // Still consume the reclaimed space: the stateful partition slides
        // down to the start point and the OEM partition stays untouched.
        ops::move_partition(tool, disk, state_part, MoveTarget::Absolute(start_point))
            .await
            .with_context(params)?;
        let table = tool.dump(disk).await.with_context(params)?;
        tracing::info!("Reclaimed the root partition.\nNew partition table:\n{table}");
        return Ok(());
    }

    let new_state_start = start_point + new_size.to_sectors();

    ops::move_partition(tool, disk, state_part, MoveTarget::Absolute(new_state_start))
        .await
        .with_context(params)?;

    ops::move_partition(tool, disk, oem_part, MoveTarget::Absolute(start_point))
        .await
        .with_context(params)?;

    ops::extend_partition(tool, disk, oem_part, new_state_start - 1)
        .await
        .with_context(params)?;

    let table = tool.dump(disk).await.with_context(params)?;
    tracing::info!("Completed extending the OEM partition.\nNew partition table:\n{table}");
    Ok(())
}
