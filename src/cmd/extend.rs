use anyhow::Result;
use async_trait::async_trait;

use crate::cmd::Command;
use crate::layout;
use crate::tools::Sfdisk;

pub struct ExtendOemCommand {
    pub options: crate::cli::ExtendOemOptions,
}

#[async_trait]
impl Command for ExtendOemCommand {
    async fn run(&self) -> Result<()> {
        let o = &self.options;

        let final_size = layout::extend_oem_partition(
            &Sfdisk,
            &o.disk,
            o.state_partition,
            o.oem_partition,
            &o.size,
        )
        .await?;

        tracing::info!(
            "OEM partition {} of {} is now {final_size} sectors",
            o.oem_partition,
            o.disk
        );
        Ok(())
    }
}
