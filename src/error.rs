use std::path::PathBuf;

/// Failure classes shared by the layout and sealing pipelines.
///
/// Every fallible operation attaches one of these to its anyhow chain
/// together with a context string carrying the full input parameters, so a
/// single log line is enough to diagnose a failed run without repeating it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid size format {0:?}, expected a sector count or a number with a B/K/M/G suffix")]
    InvalidSizeFormat(String),

    #[error("partition {0} not found in partition table")]
    PartitionNotFound(String),

    #[error("failed to write partition table back to {0}")]
    TableWriteFailed(String),

    #[error("hash tree builder failed on {0}")]
    SealToolFailed(String),

    #[error("unexpected output from {tool}: {reason}")]
    UnexpectedToolOutput { tool: &'static str, reason: String },

    #[error("no PARTUUID attribute found for {0}")]
    PartitionUuidNotFound(String),

    #[error("failed to update boot config at {0}")]
    BootConfigWriteFailed(PathBuf),
}
