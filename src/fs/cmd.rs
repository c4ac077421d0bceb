use std::process::Stdio;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::{io::AsyncWriteExt as _, process::Command};

/// Runs an external command to completion, capturing stdout. A non-zero
/// exit status becomes an error that carries the command line and both
/// output streams.
#[async_trait]
pub trait CheckCommandOutput {
    async fn run(&mut self) -> Result<Vec<u8>>;

    async fn run_with_input(&mut self, input: &[u8]) -> Result<Vec<u8>>;
}

#[async_trait]
impl CheckCommandOutput for Command {
    async fn run(&mut self) -> Result<Vec<u8>> {
        run_checked(self, None).await
    }

    async fn run_with_input(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        run_checked(self, Some(input)).await
    }
}

async fn run_checked(cmd: &mut Command, input: Option<&[u8]>) -> Result<Vec<u8>> {
    // reset all locale settings for this command
    cmd.env("LC_ALL", "C");

    tracing::trace!(cmd = ?cmd.as_std(), "run external cmd");

    if input.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to spawn {:?}", cmd.as_std()))?;

    if let Some(input) = input {
        let mut stdin = child.stdin.take().context("No stdin")?;
        stdin.write_all(input).await?;
        stdin.shutdown().await?;
    }

    let output = child
        .wait_with_output()
        .await
        .with_context(|| format!("cmd: {:?}", cmd.as_std()))?;

    if output.status.success() {
        return Ok(output.stdout);
    }

    Err(anyhow!(
        "\ncmd: {:?}\nexit code: {}\nstdout: {}\nstderr: {}",
        cmd.as_std(),
        output
            .status
            .code()
            .map(|code| code.to_string())
            .unwrap_or_else(|| "killed by signal".to_string()),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr),
    ))
    .context("External command failed")
}
