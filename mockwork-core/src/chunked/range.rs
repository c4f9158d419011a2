//! `Content-Range` parsing for chunk requests.

use crate::error::{MockworkError, Result};
use std::fmt;
use std::str::FromStr;

/// A parsed `Content-Range: bytes <from>-<to>/<total>` value. Bounds are inclusive.
///
/// Only obtainable through [`ContentRange::new`] or parsing, so
/// `from <= to < total` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    from: u64,
    to: u64,
    total: u64,
}

impl ContentRange {
    /// Create a validated range.
    pub fn new(from: u64, to: u64, total: u64) -> Result<Self> {
        let range = Self { from, to, total };
        range.validate(&range.to_string())?;
        Ok(range)
    }

    /// First byte offset.
    pub fn from(&self) -> u64 {
        self.from
    }

    /// Last byte offset (inclusive).
    pub fn to(&self) -> u64 {
        self.to
    }

    /// Total size of the payload.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of bytes the range covers, at least one.
    pub fn byte_count(&self) -> u64 {
        self.to - self.from + 1
    }

    /// Whether this range ends the payload.
    pub fn is_final(&self) -> bool {
        self.to + 1 == self.total
    }

    fn validate(&self, raw: &str) -> Result<()> {
        let invalid = |cause: &str| MockworkError::InvalidContentRange {
            value: raw.to_string(),
            cause: cause.to_string(),
        };
        if self.to < self.from {
            return Err(invalid("range end precedes range start"));
        }
        if self.to >= self.total {
            return Err(invalid("range end lies beyond the declared total"));
        }
        Ok(())
    }
}

impl FromStr for ContentRange {
    type Err = MockworkError;

    fn from_str(raw: &str) -> Result<Self> {
        let invalid = |cause: &str| MockworkError::InvalidContentRange {
            value: raw.to_string(),
            cause: cause.to_string(),
        };

        let spec = raw
            .trim()
            .strip_prefix("bytes ")
            .ok_or_else(|| invalid("expected unit 'bytes'"))?;
        let (range, total) = spec
            .split_once('/')
            .ok_or_else(|| invalid("missing '/<total>'"))?;
        let (from, to) = range
            .split_once('-')
            .ok_or_else(|| invalid("missing '<from>-<to>'"))?;

        let number = |s: &str| {
            s.trim()
                .parse::<u64>()
                .map_err(|_| invalid("offsets must be unsigned integers"))
        };

        let parsed = Self {
            from: number(from)?,
            to: number(to)?,
            total: number(total)?,
        };
        parsed.validate(raw)?;
        Ok(parsed)
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes {}-{}/{}", self.from, self.to, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_range() {
        let range: ContentRange = "bytes 512-1023/1300".parse().unwrap();
        assert_eq!(range, ContentRange::new(512, 1023, 1300).unwrap());
        assert_eq!((range.from(), range.to(), range.total()), (512, 1023, 1300));
        assert_eq!(range.byte_count(), 512);
        assert!(!range.is_final());
        assert_eq!(range.to_string(), "bytes 512-1023/1300");
    }

    #[test]
    fn constructor_rejects_inverted_bounds() {
        let err = ContentRange::new(5, 1, 10).unwrap_err();
        assert_eq!(err.code(), "E204");
        assert!(ContentRange::new(0, 10, 10).is_err());
        assert_eq!(ContentRange::new(3, 3, 4).unwrap().byte_count(), 1);
    }

    #[test]
    fn final_range() {
        let range: ContentRange = "bytes 1024-1299/1300".parse().unwrap();
        assert!(range.is_final());
    }

    #[test]
    fn rejects_malformed_values() {
        for raw in [
            "",
            "items 0-1/2",
            "bytes 0-1",
            "bytes 0/2",
            "bytes a-1/2",
            "bytes 5-1/10",
            "bytes 0-10/10",
            "bytes */10",
        ] {
            let err = raw.parse::<ContentRange>().unwrap_err();
            assert_eq!(err.code(), "E204", "{raw} should be rejected");
        }
    }
}
