//! Sealing a partition with a dm-verity hash tree.
//!
//! The hash tree is written into the sealed partition itself, immediately
//! after the filesystem: the first `fs_size_blocks` 4 KiB blocks hold the
//! data, the tree starts at byte offset `fs_size_blocks * 4096`.

pub mod grub;

use anyhow::{bail, Context as _, Result};

use crate::error::Error;
use crate::tools::HashTreeBuilder;

/// Data and hash block size handed to the hash tree builder.
pub const BLOCK_SIZE: u64 = 4096;

/// Root digest and salt reported by the hash tree builder, produced once
/// per sealing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerityResult {
    pub root_digest: String,
    pub salt: String,
}

/// Builds the hash tree over the first `fs_size_blocks` 4 KiB blocks of
/// `device` and returns the reported root digest and salt.
pub async fn seal(
    builder: &dyn HashTreeBuilder,
    device: &str,
    fs_size_blocks: u64,
) -> Result<VerityResult> {
    if device.is_empty() || fs_size_blocks == 0 {
        bail!(Error::InvalidArgument(format!(
            "device={device:?}, fs_size_blocks={fs_size_blocks}"
        )))
    }

    let hash_offset = fs_size_blocks
        .checked_mul(BLOCK_SIZE)
        .with_context(|| format!("hash offset overflows for fs_size_blocks={fs_size_blocks}"))?;

    let report = builder
        .format(device, device, fs_size_blocks, hash_offset)
        .await
        .with_context(|| format!("device={device:?}, fs_size_blocks={fs_size_blocks}"))?;

    parse_format_report(&report)
}

/// The report must end with, in order: a "Salt:" line, a "Root hash:" line
/// and a trailing newline. Anything else is rejected outright; no
/// best-effort scan of the full report is attempted.
fn parse_format_report(report: &str) -> Result<VerityResult> {
    let unexpected = |reason: String| Error::UnexpectedToolOutput {
        tool: "veritysetup",
        reason,
    };

    let lines: Vec<&str> = report.split('\n').collect();
    if lines.len() < 3 {
        bail!(unexpected(format!("report too short: {report:?}")))
    }
    if !lines[lines.len() - 1].is_empty() {
        bail!(unexpected(format!(
            "report does not end with a newline: {report:?}"
        )))
    }

    let Some(root_digest) = lines[lines.len() - 2].strip_prefix("Root hash:") else {
        bail!(unexpected(format!(
            "second-to-last line is not \"Root hash:\": {report:?}"
        )))
    };
    let Some(salt) = lines[lines.len() - 3].strip_prefix("Salt:") else {
        bail!(unexpected(format!(
            "third-to-last line is not \"Salt:\": {report:?}"
        )))
    };

    Ok(VerityResult {
        root_digest: root_digest.trim().to_string(),
        salt: salt.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::Mutex;

    const REPORT: &str = "VERITY header information for /dev/sda8\n\
UUID:               \n\
Hash type:          0\n\
Data blocks:        2048\n\
Data block size:    4096\n\
Hash block size:    4096\n\
Hash algorithm:     sha256\n\
Salt:               9cd7ba29a1771b2097a7d72be8c13b29766d7617c3b924eb0cf23ff5071fee47\n\
Root hash:          d6b862d01e01e6417a1b5e7eb0eed2a2189594b74325dd0749cd83bbf78f5dc8\n";

    struct FakeBuilder {
        calls: Mutex<Vec<(String, String, u64, u64)>>,
        report: &'static str,
    }

    impl FakeBuilder {
        fn new(report: &'static str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                report,
            }
        }
    }

    #[async_trait::async_trait]
    impl HashTreeBuilder for FakeBuilder {
        async fn format(
            &self,
            data_dev: &str,
            hash_dev: &str,
            data_blocks: u64,
            hash_offset: u64,
        ) -> Result<String> {
            self.calls.lock().await.push((
                data_dev.to_string(),
                hash_dev.to_string(),
                data_blocks,
                hash_offset,
            ));
            Ok(self.report.to_string())
        }
    }

    #[tokio::test]
    async fn seal_invokes_the_builder_with_block_counts_and_offset() {
        let builder = FakeBuilder::new(REPORT);
        let result = seal(&builder, "/dev/sda8", 2048).await.unwrap();

        let calls = builder.calls.lock().await;
        assert_eq!(
            *calls,
            vec![("/dev/sda8".to_string(), "/dev/sda8".to_string(), 2048, 8388608)]
        );
        assert_eq!(
            result,
            VerityResult {
                root_digest: "d6b862d01e01e6417a1b5e7eb0eed2a2189594b74325dd0749cd83bbf78f5dc8"
                    .to_string(),
                salt: "9cd7ba29a1771b2097a7d72be8c13b29766d7617c3b924eb0cf23ff5071fee47"
                    .to_string(),
            }
        );
    }

    #[tokio::test]
    async fn seal_rejects_empty_device_and_zero_blocks() {
        let builder = FakeBuilder::new(REPORT);
        for (dev, blocks) in [("", 2048), ("/dev/sda8", 0)] {
            let err = seal(&builder, dev, blocks).await.unwrap_err();
            assert!(matches!(
                err.downcast_ref::<Error>(),
                Some(Error::InvalidArgument(_))
            ));
        }
        assert!(builder.calls.lock().await.is_empty());
    }

    fn assert_unexpected(report: &str) {
        let err = parse_format_report(report).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::UnexpectedToolOutput {
                tool: "veritysetup",
                ..
            })
        ));
    }

    #[test]
    fn report_without_trailing_newline_is_rejected() {
        assert_unexpected(REPORT.trim_end());
    }

    #[test]
    fn report_with_swapped_labels_is_rejected() {
        assert_unexpected("Hash algorithm: sha256\nRoot hash: aa\nSalt: bb\n");
    }

    #[test]
    fn short_report_is_rejected() {
        assert_unexpected("");
        assert_unexpected("\n");
    }
}
