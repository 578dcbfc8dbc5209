//! Firmware version parsing and comparison
//!
//! Versions are compared as three numeric components so that "2.10.0" is
//! newer than "2.9.0". Node firmware reports whatever string it was built
//! with, so parsing never fails: a missing or non-numeric component counts
//! as `0`.

use std::cmp::Ordering;
use std::fmt;

/// A `major.minor.patch` firmware version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FirmwareVersion {
    /// Major component
    pub major: u32,
    /// Minor component
    pub minor: u32,
    /// Patch component
    pub patch: u32,
}

impl FirmwareVersion {
    /// Create a version from components.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse leniently.
    ///
    /// A leading `v` is ignored. Each component contributes its leading
    /// digits; components beyond the third are ignored.
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();
        let trimmed = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        let mut parts = trimmed.split('.').map(leading_number);
        let major = parts.next().unwrap_or(0);
        let minor = parts.next().unwrap_or(0);
        let patch = parts.next().unwrap_or(0);
        Self::new(major, minor, patch)
    }
}

fn leading_number(part: &str) -> u32 {
    let digits: String = part
        .trim()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().unwrap_or(0)
}

impl PartialOrd for FirmwareVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FirmwareVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Whether `candidate` is strictly newer than `current`.
pub fn is_newer(current: &str, candidate: &str) -> bool {
    FirmwareVersion::parse(candidate) > FirmwareVersion::parse(current)
}
