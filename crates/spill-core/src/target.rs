//! Addresses whose byte values are to be recovered.

use serde::Serialize;
use std::fmt::{Debug, Formatter};
use std::ops::Add;
use std::str::FromStr;
use thiserror::Error;

#[repr(transparent)]
#[derive(Clone, Copy, Default, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Virtual address of a byte to leak.
///
/// A newtype wrapper around a machine address. The address is never
/// dereferenced architecturally by the TSX platform, so it may point to
/// memory the process is not permitted to read.
pub struct TargetAddr(usize);

impl Debug for TargetAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("TargetAddr(0x{:02x})", self.0))
    }
}

impl std::fmt::LowerHex for TargetAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        std::fmt::LowerHex::fmt(&self.0, f)
    }
}

impl TargetAddr {
    /// Creates a new target address.
    pub fn new(addr: usize) -> Self {
        TargetAddr(addr)
    }

    /// Returns the address as a usize.
    pub fn as_usize(&self) -> usize {
        self.0
    }

    /// Returns the address as a raw pointer.
    pub fn as_ptr(&self) -> *const u8 {
        self.0 as *const u8
    }

    /// Returns the `len` consecutive addresses starting at `self`.
    ///
    /// The range saturates at the top of the address space.
    pub fn range(self, len: usize) -> impl Iterator<Item = TargetAddr> {
        let end = self.0.saturating_add(len);
        (self.0..end).map(TargetAddr)
    }
}

impl Add<usize> for TargetAddr {
    type Output = TargetAddr;

    fn add(self, rhs: usize) -> Self::Output {
        TargetAddr(self.0.wrapping_add(rhs))
    }
}

impl From<usize> for TargetAddr {
    fn from(value: usize) -> Self {
        TargetAddr(value)
    }
}

impl From<*const u8> for TargetAddr {
    fn from(value: *const u8) -> Self {
        TargetAddr(value as usize)
    }
}

/// Error parsing a hexadecimal target address.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseTargetError {
    /// The input was empty (after stripping an optional `0x` prefix).
    #[error("empty address")]
    Empty,
    /// The input is not a valid hexadecimal number.
    #[error("invalid hexadecimal address {0:?}")]
    Invalid(String),
}

impl FromStr for TargetAddr {
    type Err = ParseTargetError;

    /// Parses a hexadecimal address, with or without a `0x`/`0X` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.is_empty() {
            return Err(ParseTargetError::Empty);
        }
        usize::from_str_radix(digits, 16)
            .map(TargetAddr)
            .map_err(|_| ParseTargetError::Invalid(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prefixed() {
        assert_eq!(
            "0xffff8800deadbeef".parse::<TargetAddr>(),
            Ok(TargetAddr(0xffff8800deadbeef))
        );
        assert_eq!("0X10".parse::<TargetAddr>(), Ok(TargetAddr(0x10)));
    }

    #[test]
    fn test_parse_bare() {
        assert_eq!("7f00ab".parse::<TargetAddr>(), Ok(TargetAddr(0x7f00ab)));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<TargetAddr>(), Err(ParseTargetError::Empty));
        assert_eq!("0x".parse::<TargetAddr>(), Err(ParseTargetError::Empty));
        assert!(matches!(
            "0xnothex".parse::<TargetAddr>(),
            Err(ParseTargetError::Invalid(_))
        ));
    }

    #[test]
    fn test_range() {
        let addrs: Vec<_> = TargetAddr(0x1000).range(3).collect();
        assert_eq!(
            addrs,
            vec![TargetAddr(0x1000), TargetAddr(0x1001), TargetAddr(0x1002)]
        );
        assert_eq!(TargetAddr(usize::MAX - 1).range(10).count(), 1);
    }

    #[test]
    fn test_debug_format() {
        assert_eq!(format!("{:?}", TargetAddr(0xab)), "TargetAddr(0xab)");
        assert_eq!(format!("{:016x}", TargetAddr(0xab)), "00000000000000ab");
    }
}
