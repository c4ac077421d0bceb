use anyhow::{Context as _, Result};
use async_trait::async_trait;

use crate::cmd::Command;
use crate::fs::mount::TmpMountPoint;
use crate::partition::ops::partition_name;
use crate::tools::{Blkid, Veritysetup};
use crate::verity;

pub struct SealOemCommand {
    pub options: crate::cli::SealOemOptions,
}

#[async_trait]
impl Command for SealOemCommand {
    async fn run(&self) -> Result<()> {
        let o = &self.options;
        let oem_dev = partition_name(&o.disk, o.oem_partition);

        let result = verity::seal(&Veritysetup, &oem_dev, o.fs_size_blocks).await?;
        tracing::info!("Hash tree written for {oem_dev}");

        let part_uuid = verity::grub::part_uuid(&Blkid, &oem_dev)
            .await
            .with_context(|| format!("Cannot resolve PARTUUID of {oem_dev}"))?;

        let efi_dev = partition_name(&o.disk, o.efi_partition);
        let efi = TmpMountPoint::mount(&efi_dev).await?;
        tracing::info!("EFI partition {efi_dev} mounted");

        let grub_path = efi.mount_point().join("efi/boot/grub.cfg");
        verity::grub::append_dm_entry(
            &grub_path,
            &o.dm_name,
            &part_uuid,
            &result,
            o.fs_size_blocks,
        )
        .await?;

        tracing::info!("Kernel command line updated");
        Ok(())
    }
}
