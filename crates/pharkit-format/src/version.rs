//! Nibble-packed archive API version

use crate::error::{PharError, PharResult};
use std::fmt;
use std::str::FromStr;

/// Archive API version, three parts each in `0..=15`.
///
/// On disk the version takes two bytes: `major << 4 | minor`, then
/// `patch << 4`. The low nibble of the second byte is unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    /// Major part
    pub major: u8,
    /// Minor part
    pub minor: u8,
    /// Patch part
    pub patch: u8,
}

impl Version {
    /// Largest value a single part can hold
    pub const MAX_PART: u8 = 15;

    /// Build a version, rejecting parts above 15
    pub fn new(major: u8, minor: u8, patch: u8) -> PharResult<Self> {
        for part in [major, minor, patch] {
            if part > Self::MAX_PART {
                return Err(PharError::InvalidVersion(format!(
                    "{major}.{minor}.{patch}: part {part} does not fit a nibble"
                )));
            }
        }
        Ok(Self {
            major,
            minor,
            patch,
        })
    }

    /// Encode to the two on-disk bytes
    pub const fn to_nibbles(self) -> [u8; 2] {
        [(self.major << 4) | self.minor, self.patch << 4]
    }

    /// Decode the two on-disk bytes
    pub const fn from_nibbles(bytes: [u8; 2]) -> Self {
        Self {
            major: bytes[0] >> 4,
            minor: bytes[0] & 0x0F,
            patch: bytes[1] >> 4,
        }
    }
}

impl Default for Version {
    fn default() -> Self {
        Self {
            major: 1,
            minor: 1,
            patch: 1,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = PharError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(PharError::InvalidVersion(format!(
                "'{s}': expected three dot-separated parts"
            )));
        }

        let mut nums = [0u8; 3];
        for (slot, part) in nums.iter_mut().zip(&parts) {
            *slot = part
                .parse::<u8>()
                .map_err(|_| PharError::InvalidVersion(format!("'{s}': '{part}' is not 0-15")))?;
        }

        Self::new(nums[0], nums[1], nums[2])
    }
}
