use anyhow::{bail, Result};

use crate::error::Error;

/// Sector size of the partition tables we deal with. All sector/byte
/// conversions in this crate go through this one constant.
pub const SECTOR_SIZE: u64 = 512;

/// A partition size as given on the command line. A bare number is a raw
/// sector count; a number with a B/K/M/G suffix is a byte quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeSpec {
    Sectors(u64),
    Bytes(u64),
}

impl SizeSpec {
    pub fn to_bytes(self) -> u64 {
        match self {
            SizeSpec::Sectors(sectors) => sectors * SECTOR_SIZE,
            SizeSpec::Bytes(bytes) => bytes,
        }
    }

    pub fn to_sectors(self) -> u64 {
        match self {
            SizeSpec::Sectors(sectors) => sectors,
            SizeSpec::Bytes(bytes) => bytes / SECTOR_SIZE,
        }
    }
}

/// Parses a size string like "5000" (sectors), "3G", "100M", "10000K" or
/// "99999B" (bytes, binary multipliers).
pub fn parse_size(spec: &str) -> Result<SizeSpec> {
    let invalid = || Error::InvalidSizeFormat(spec.to_string());

    let Some(last) = spec.chars().last() else {
        bail!(invalid())
    };

    let (magnitude, multiplier) = match last {
        'B' => (&spec[..spec.len() - 1], Some(1)),
        'K' => (&spec[..spec.len() - 1], Some(1 << 10)),
        'M' => (&spec[..spec.len() - 1], Some(1 << 20)),
        'G' => (&spec[..spec.len() - 1], Some(1 << 30)),
        _ => (spec, None),
    };

    let Ok(value) = magnitude.parse::<u64>() else {
        bail!(invalid())
    };

    match multiplier {
        Some(multiplier) => match value.checked_mul(multiplier) {
            Some(bytes) => Ok(SizeSpec::Bytes(bytes)),
            None => bail!(invalid()),
        },
        None => Ok(SizeSpec::Sectors(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("10B", 10)]
    #[case("10K", 10 * 1024)]
    #[case("10M", 10 * 1024 * 1024)]
    #[case("10G", 10 * 1024 * 1024 * 1024)]
    #[case("0B", 0)]
    fn parses_suffixed_sizes_as_bytes(#[case] spec: &str, #[case] bytes: u64) {
        assert_eq!(parse_size(spec).unwrap(), SizeSpec::Bytes(bytes));
        assert_eq!(parse_size(spec).unwrap().to_bytes(), bytes);
    }

    #[test]
    fn bare_number_is_a_sector_count() {
        assert_eq!(parse_size("5000").unwrap(), SizeSpec::Sectors(5000));
        assert_eq!(parse_size("5000").unwrap().to_bytes(), 5000 * 512);
        assert_eq!(parse_size("5000").unwrap().to_sectors(), 5000);
    }

    #[test]
    fn byte_sizes_convert_to_sectors() {
        assert_eq!(parse_size("3G").unwrap().to_sectors(), 6291456);
    }

    #[rstest]
    #[case("")]
    #[case("abc")]
    #[case("12T")]
    #[case("G")]
    #[case("1.5G")]
    #[case("-5M")]
    fn rejects_malformed_sizes(#[case] spec: &str) {
        let err = parse_size(spec).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidSizeFormat(_))
        ));
    }

    #[test]
    fn rejects_multiplier_overflow() {
        let err = parse_size("99999999999G").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidSizeFormat(_))
        ));
    }
}
