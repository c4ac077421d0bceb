//! Codec for the sfdisk dump format.
//!
//! A dump looks like:
//!
//! ```text
//! label: gpt
//! label-id: 8161BFB1-8089-A745-BDBF-85AE12D9C4B9
//! device: /dev/sda
//! unit: sectors
//!
//! /dev/sda1 : start=     4401152, size=     2097152, type=0FC63DAF-..., name="STATE"
//! /dev/sda8 : start=     2531328, size=       32768, type=0FC63DAF-..., name="OEM"
//! ```
//!
//! The dump is the wire format both ways: sfdisk re-applies whatever we give
//! back to it, so everything we do not intentionally change must survive
//! byte-for-byte. Mutation therefore rewrites only the digits of the
//! `start=`/`size=` fields of the one matched entry line.

use anyhow::{bail, Result};

use crate::error::Error;

/// The only fields of a partition entry this crate reads or rewrites, in
/// sectors. Everything else on the entry line is passed through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartContent {
    pub start: u64,
    pub size: u64,
}

/// Finds the entry for `part_name` (e.g. "/dev/sda8"), decodes its start and
/// size, lets `mutate` change them, and returns the table with only those
/// numeric fields rewritten. A missing entry fails with
/// [`Error::PartitionNotFound`] when `require_match` is set and otherwise
/// returns the table unchanged.
pub fn parse_and_mutate(
    table: &str,
    part_name: &str,
    require_match: bool,
    mutate: impl FnOnce(&mut PartContent),
) -> Result<String> {
    let mut lines: Vec<String> = table.split('\n').map(str::to_string).collect();

    let Some(index) = lines.iter().position(|line| is_entry_for(line, part_name)) else {
        if require_match {
            bail!(Error::PartitionNotFound(part_name.to_string()))
        }
        return Ok(lines.join("\n"));
    };

    let line = &mut lines[index];
    let old = decode_entry(line, part_name)?;
    let mut content = old;
    mutate(&mut content);

    let mut patched = line.clone();
    if content.start != old.start {
        patched = replace_field(&patched, part_name, "start=", content.start)?;
    }
    if content.size != old.size {
        patched = replace_field(&patched, part_name, "size=", content.size)?;
    }
    *line = patched;

    Ok(lines.join("\n"))
}

/// Read-only variant of [`parse_and_mutate`]: returns the entry's current
/// start and size without touching the table.
pub fn read_entry(table: &str, part_name: &str) -> Result<PartContent> {
    for line in table.split('\n') {
        if is_entry_for(line, part_name) {
            return decode_entry(line, part_name);
        }
    }
    bail!(Error::PartitionNotFound(part_name.to_string()))
}

/// An entry line starts with the device name of the partition, followed by
/// a colon. The name is compared exactly, so "/dev/sda1" never matches the
/// "/dev/sda11" line.
fn is_entry_for(line: &str, part_name: &str) -> bool {
    match line.split_once(':') {
        Some((name, _)) => name.trim() == part_name,
        None => false,
    }
}

fn decode_entry(line: &str, part_name: &str) -> Result<PartContent> {
    Ok(PartContent {
        start: read_field(line, part_name, "start=")?.1,
        size: read_field(line, part_name, "size=")?.1,
    })
}

/// Locates `key` ("start=" or "size=") on an entry line and parses the
/// digits following it, skipping the alignment padding sfdisk emits between
/// the `=` and the number. Returns the byte range of the digits and the
/// parsed value.
fn read_field(
    line: &str,
    part_name: &str,
    key: &'static str,
) -> Result<(std::ops::Range<usize>, u64)> {
    let malformed = |reason: String| Error::UnexpectedToolOutput {
        tool: "sfdisk",
        reason,
    };

    let Some(key_pos) = line.find(key) else {
        bail!(malformed(format!(
            "entry for {part_name} has no {key:?} field: {line:?}"
        )))
    };

    let after_key = key_pos + key.len();
    let padding = line[after_key..]
        .find(|c: char| c != ' ')
        .unwrap_or(line.len() - after_key);
    let digits_start = after_key + padding;
    let digits_len = line[digits_start..]
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(line.len() - digits_start);
    let digits = digits_start..digits_start + digits_len;

    let Ok(value) = line[digits.clone()].parse::<u64>() else {
        bail!(malformed(format!(
            "entry for {part_name} has a non-numeric {key:?} field: {line:?}"
        )))
    };

    Ok((digits, value))
}

/// Rewrites the digits of one field in place, keeping the padding and every
/// surrounding byte of the line as-is.
fn replace_field(line: &str, part_name: &str, key: &'static str, value: u64) -> Result<String> {
    let (digits, _) = read_field(line, part_name, key)?;
    let mut patched = String::with_capacity(line.len());
    patched.push_str(&line[..digits.start]);
    patched.push_str(&value.to_string());
    patched.push_str(&line[digits.end..]);
    Ok(patched)
}
