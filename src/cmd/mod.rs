use anyhow::Result;
use async_trait::async_trait;

pub mod extend;
pub mod reorganize;
pub mod seal;

#[async_trait]
pub trait Command {
    async fn run(&self) -> Result<()>;
}

pub trait IntoCommand {
    fn into_command(self) -> Box<dyn Command>;
}

impl IntoCommand for crate::cli::Command {
    fn into_command(self) -> Box<dyn Command> {
        match self {
            crate::cli::Command::ExtendOem(options) => {
                Box::new(extend::ExtendOemCommand { options })
            }
            crate::cli::Command::Reorganize(options) => {
                Box::new(reorganize::ReorganizeCommand { options })
            }
            crate::cli::Command::SealOem(options) => Box::new(seal::SealOemCommand { options }),
        }
    }
}
