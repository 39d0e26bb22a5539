//! Strict dotted-numeric version numbers.
//!
//! Accepts `N.N`, `N.N.N` and an optional `aN` / `bN` pre-release tag, e.g.
//! `2.1`, `2.5.0`, `1.0b3`. A two-part version equals its `.0` three-part form.

use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Pre-release tag of a [`StrictVersion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreRelease {
    Alpha(u64),
    Beta(u64),
}

/// A parsed strict version number.
#[derive(Debug, Clone)]
pub struct StrictVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: Option<u64>,
    pub pre_release: Option<PreRelease>,
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d+)\.(\d+)(?:\.(\d+))?(?:([ab])(\d+))?$").expect("valid version regex")
    })
}

impl StrictVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch: Some(patch),
            pre_release: None,
        }
    }

    fn sort_key(&self) -> (u64, u64, u64, (u8, u64)) {
        // A release sorts after all of its pre-releases.
        let pre = match self.pre_release {
            Some(PreRelease::Alpha(n)) => (0, n),
            Some(PreRelease::Beta(n)) => (1, n),
            None => (2, 0),
        };
        (self.major, self.minor, self.patch.unwrap_or(0), pre)
    }
}

/// Error returned when a string is not a strict version number.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version number '{0}'")]
pub struct ParseVersionError(pub String);

impl FromStr for StrictVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = version_regex()
            .captures(s)
            .ok_or_else(|| ParseVersionError(s.to_string()))?;
        let num = |i: usize| -> Result<Option<u64>, ParseVersionError> {
            caps.get(i)
                .map(|m| m.as_str().parse::<u64>())
                .transpose()
                .map_err(|_| ParseVersionError(s.to_string()))
        };

        let major = num(1)?.ok_or_else(|| ParseVersionError(s.to_string()))?;
        let minor = num(2)?.ok_or_else(|| ParseVersionError(s.to_string()))?;
        let patch = num(3)?;
        let pre_release = match (caps.get(4).map(|m| m.as_str()), num(5)?) {
            (Some("a"), Some(n)) => Some(PreRelease::Alpha(n)),
            (Some(_), Some(n)) => Some(PreRelease::Beta(n)),
            _ => None,
        };

        Ok(Self {
            major,
            minor,
            patch,
            pre_release,
        })
    }
}

impl fmt::Display for StrictVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if let Some(patch) = self.patch {
            write!(f, ".{}", patch)?;
        }
        match self.pre_release {
            Some(PreRelease::Alpha(n)) => write!(f, "a{}", n),
            Some(PreRelease::Beta(n)) => write!(f, "b{}", n),
            None => Ok(()),
        }
    }
}

impl PartialEq for StrictVersion {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for StrictVersion {}

impl PartialOrd for StrictVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StrictVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}
