use anyhow::Result;
use async_trait::async_trait;

use crate::cmd::Command;
use crate::layout;
use crate::tools::Sfdisk;

pub struct ReorganizeCommand {
    pub options: crate::cli::ReorganizeOptions,
}

#[async_trait]
impl Command for ReorganizeCommand {
    async fn run(&self) -> Result<()> {
        let o = &self.options;

        layout::reorganize_disk(
            &Sfdisk,
            &o.disk,
            o.state_partition,
            o.oem_partition,
            o.root_partition,
            &o.size,
            o.reclaim_root,
        )
        .await
    }
}
