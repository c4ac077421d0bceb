//! Patching the GRUB kernel command line with a dm-verity target.
//!
//! A target line in grub.cfg looks like
//!
//! ```text
//! ... root=/dev/dm-0 dm="1 vroot none ro 1,0 4077568 verity payload=PARTUUID=... salt=..."
//! ```
//!
//! The leading digit of the dm= value counts the device-mapper targets.
//! Appending a target means incrementing that count and inserting a new
//! comma-separated target descriptor before the closing quote. Lines
//! without the marker are left byte-identical.

use std::path::Path;

use anyhow::{bail, Context as _, Result};
use tokio::fs;

use crate::error::Error;
use crate::partition::size::SECTOR_SIZE;
use crate::tools::BlockAttrs;
use crate::verity::{VerityResult, BLOCK_SIZE};

const DM_MARKER: &str = "dm=\"";

/// Resolves the PARTUUID of `part_name` from the block device attribute
/// listing. Matching is on the exact device path (name followed by a
/// colon), so "/dev/sda1" never picks up the "/dev/sda11" line.
pub async fn part_uuid(attrs: &dyn BlockAttrs, part_name: &str) -> Result<String> {
    let listing = attrs.list().await?;
    find_part_uuid(&listing, part_name)
}

fn find_part_uuid(listing: &str, part_name: &str) -> Result<String> {
    for line in listing.lines() {
        let Some(rest) = line.strip_prefix(part_name).and_then(|r| r.strip_prefix(':')) else {
            continue;
        };
        for attr in rest.split_whitespace() {
            if let Some(value) = attr.strip_prefix("PARTUUID=") {
                return Ok(value.trim_matches('"').to_string());
            }
        }
    }
    bail!(Error::PartitionUuidNotFound(part_name.to_string()))
}

/// Adds a verity target for the sealed partition to every dm= kernel
/// command line in the boot config at `path` and writes the file back in
/// full.
pub async fn append_dm_entry(
    path: &Path,
    dm_name: &str,
    part_uuid: &str,
    verity: &VerityResult,
    fs_size_blocks: u64,
) -> Result<()> {
    let content = fs::read_to_string(path)
        .await
        .context(Error::BootConfigWriteFailed(path.to_path_buf()))?;

    let target = verity_target(dm_name, part_uuid, verity, fs_size_blocks);
    let patched = patch_config(&content, &target)
        .with_context(|| format!("Failed to patch boot config at {path:?}"))?;

    fs::write(path, patched)
        .await
        .context(Error::BootConfigWriteFailed(path.to_path_buf()))
}

/// The target descriptor appended to each dm= value. Payload and hash tree
/// share the same PARTUUID because the tree lives inside the sealed
/// partition, starting `fs_size_blocks` blocks in.
fn verity_target(
    dm_name: &str,
    part_uuid: &str,
    verity: &VerityResult,
    fs_size_blocks: u64,
) -> String {
    // 4 KiB blocks to 512-byte sectors.
    let hash_start = fs_size_blocks * (BLOCK_SIZE / SECTOR_SIZE);
    format!(
        "{dm_name} none ro 1,0 {hash_start} verity payload=PARTUUID={part_uuid} \
         hashtree=PARTUUID={part_uuid} hashstart={hash_start} alg=sha256 \
         root_hexdigest={root} salt={salt}",
        root = verity.root_digest,
        salt = verity.salt,
    )
}

fn patch_config(content: &str, target: &str) -> Result<String> {
    let lines = content
        .split('\n')
        .map(|line| {
            if line.contains(DM_MARKER) {
                patch_line(line, target)
            } else {
                Ok(line.to_string())
            }
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(lines.join("\n"))
}

fn patch_line(line: &str, target: &str) -> Result<String> {
    // contains(DM_MARKER) was checked by the caller
    let value_start = line.find(DM_MARKER).context("dm= marker vanished")? + DM_MARKER.len();

    let count_len = line[value_start..]
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(line.len() - value_start);
    if count_len == 0 {
        bail!("dm= parameter has no leading target count: {line:?}")
    }
    let count: u32 = line[value_start..value_start + count_len]
        .parse()
        .with_context(|| format!("unparseable dm= target count in {line:?}"))?;

    // Insert before the closing quote of the dm= value. The original
    // config is expected to close the quote, but a line that does not is
    // extended at its end.
    let insert_at = match line[value_start + count_len..].find('"') {
        Some(offset) => value_start + count_len + offset,
        None => line.len(),
    };

    let mut patched = String::with_capacity(line.len() + target.len() + 2);
    patched.push_str(&line[..value_start]);
    patched.push_str(&(count + 1).to_string());
    patched.push_str(&line[value_start + count_len..insert_at]);
    patched.push(',');
    patched.push_str(target);
    patched.push_str(&line[insert_at..]);
    Ok(patched)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLKID: &str = r#"/dev/sda1: LABEL="STATE" UUID="120991ff-4f12-43bf-b962-17325185121d" TYPE="ext4"
/dev/sda3: LABEL="ROOT-A" SEC_TYPE="ext2" TYPE="ext4" PARTLABEL="ROOT-A" PARTUUID="00ce255b-db42-1e47-a62b-735c7a9a7397"
/dev/sda8: LABEL="OEM" UUID="1401457b-449d-4755-9a1e-57054b287489" TYPE="ext4" PARTLABEL="OEM" PARTUUID="9db2ae75-98dc-5b4f-a38b-b3cb0b80b17f"
/dev/dm-0: LABEL="ROOT-A" SEC_TYPE="ext2" TYPE="ext4"
/dev/sda11: PARTLABEL="RWFW" PARTUUID="682ef1a5-f7f6-7d42-a407-5d8ad0430fc1"
"#;

    fn result() -> VerityResult {
        VerityResult {
            root_digest: "d6b862d0".to_string(),
            salt: "9cd7ba29".to_string(),
        }
    }

    #[test]
    fn part_uuid_is_extracted_from_the_matching_line() {
        assert_eq!(
            find_part_uuid(BLKID, "/dev/sda8").unwrap(),
            "9db2ae75-98dc-5b4f-a38b-b3cb0b80b17f"
        );
    }

    #[test]
    fn part_uuid_matching_is_exact_on_the_device_path() {
        assert_eq!(
            find_part_uuid(BLKID, "/dev/sda1")
                .unwrap_err()
                .downcast_ref::<Error>()
                .map(|e| matches!(e, Error::PartitionUuidNotFound(_))),
            Some(true)
        );
        assert_eq!(
            find_part_uuid(BLKID, "/dev/sda11").unwrap(),
            "682ef1a5-f7f6-7d42-a407-5d8ad0430fc1"
        );
    }

    #[test]
    fn part_uuid_missing_device_is_an_error() {
        let err = find_part_uuid(BLKID, "/dev/sda9").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::PartitionUuidNotFound(_))
        ));
    }

    #[test]
    fn dm_lines_gain_a_second_target_and_other_lines_stay_identical() {
        let config = "set default=0\n\
linux /syslinux/vmlinuz.A init=/usr/lib/systemd/systemd root=/dev/dm-0 dm=\"1 vroot none ro 1,0 4077568 verity payload=PARTUUID=8AC60384 hashtree=PARTUUID=8AC60384 hashstart=4077568 alg=sha256 root_hexdigest=aa salt=bb\"\n\
linux /syslinux/vmlinuz.B root=/dev/sda3\n";

        let target = verity_target(
            "oemroot",
            "9db2ae75-98dc-5b4f-a38b-b3cb0b80b17f",
            &result(),
            100,
        );
        let patched = patch_config(config, &target).unwrap();

        let lines: Vec<&str> = patched.split('\n').collect();
        assert_eq!(lines[0], "set default=0");
        assert_eq!(lines[2], "linux /syslinux/vmlinuz.B root=/dev/sda3");

        let dm_line = lines[1];
        assert!(dm_line.contains("dm=\"2 vroot"));
        // 100 blocks of 4 KiB = 800 sectors.
        assert!(dm_line.contains(
            ",oemroot none ro 1,0 800 verity payload=PARTUUID=9db2ae75-98dc-5b4f-a38b-b3cb0b80b17f"
        ));
        assert!(dm_line.ends_with("root_hexdigest=d6b862d0 salt=9cd7ba29\""));
    }

    #[test]
    fn target_count_is_incremented_not_overwritten() {
        let config = "dm=\"2 vroot none ro 1,0 10 verity a,extra none ro 1,0 10 verity b\"\n";
        let patched = patch_config(config, "new none ro 1,0 8 verity c").unwrap();
        assert!(patched.starts_with("dm=\"3 vroot"));
        assert!(patched.contains("verity b,new none ro 1,0 8 verity c\""));
    }

    #[test]
    fn a_count_without_digits_is_rejected() {
        let err = patch_config("dm=\"x vroot\"\n", "t").unwrap_err();
        assert!(err.to_string().contains("target count"));
    }

    #[tokio::test]
    async fn append_dm_entry_rewrites_the_file_in_place() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("grub.cfg");
        fs::write(
            &path,
            "menuentry A\nlinux vmlinuz dm=\"1 vroot none ro 1,0 16 verity x\"\n",
        )
        .await?;

        append_dm_entry(&path, "oemroot", "9db2ae75", &result(), 2).await?;

        let content = fs::read_to_string(&path).await?;
        assert!(content.starts_with("menuentry A\n"));
        assert!(content.contains("dm=\"2 vroot none ro 1,0 16 verity x,oemroot none ro 1,0 16 "));
        Ok(())
    }

    #[tokio::test]
    async fn append_dm_entry_missing_file_is_a_boot_config_failure() {
        let err = append_dm_entry(
            Path::new("/nonexistent/grub.cfg"),
            "oemroot",
            "uuid",
            &result(),
            2,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::BootConfigWriteFailed(_))
        ));
    }
}
