//! Maintenance-info versions.
//!
//! Versions are compared numerically segment by segment with missing
//! segments treated as zero, so `1.2` equals `1.2.0`. Build metadata after
//! `+` is ignored for equality; a pre-release suffix sorts before the
//! release it qualifies.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

static VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^v?([0-9]+(?:\.[0-9]+)*)(?:-([0-9A-Za-z\-]+(?:\.[0-9A-Za-z\-]+)*))?(?:\+([0-9A-Za-z\-]+(?:\.[0-9A-Za-z\-]+)*))?$",
    )
    .expect("Invalid version regex")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Malformed version: {0}")]
pub struct VersionError(pub String);

#[derive(Debug, Clone)]
pub struct Version {
    segments: Vec<u64>,
    pre: String,
    metadata: String,
    original: String,
}

impl Version {
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let caps = VERSION
            .captures(s.trim())
            .ok_or_else(|| VersionError(s.to_string()))?;
        let mut segments = caps[1]
            .split('.')
            .map(|seg| seg.parse::<u64>().map_err(|_| VersionError(s.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        while segments.len() < 3 {
            segments.push(0);
        }
        Ok(Self {
            segments,
            pre: caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
            metadata: caps.get(3).map(|m| m.as_str().to_string()).unwrap_or_default(),
            original: s.to_string(),
        })
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn prerelease(&self) -> &str {
        &self.pre
    }

    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    fn segment(&self, i: usize) -> u64 {
        self.segments.get(i).copied().unwrap_or(0)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let segs: Vec<String> = self.segments.iter().map(u64::to_string).collect();
        f.write_str(&segs.join("."))?;
        if !self.pre.is_empty() {
            write!(f, "-{}", self.pre)?;
        }
        if !self.metadata.is_empty() {
            write!(f, "+{}", self.metadata)?;
        }
        Ok(())
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            match self.segment(i).cmp(&other.segment(i)) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        match (self.pre.is_empty(), other.pre.is_empty()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.pre.cmp(&other.pre),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_segments_are_zero() {
        assert_eq!(Version::parse("1.2").unwrap(), Version::parse("1.2.0").unwrap());
        assert_eq!(Version::parse("v2").unwrap(), Version::parse("2.0.0").unwrap());
    }

    #[test]
    fn ordering() {
        let v = |s| Version::parse(s).unwrap();
        assert!(v("1.10.0") > v("1.9.9"));
        assert!(v("1.0.0-beta") < v("1.0.0"));
        assert_eq!(v("1.0.0+build1"), v("1.0.0+build2"));
    }

    #[test]
    fn rejects_garbage() {
        let err = Version::parse("not-a-version").unwrap_err();
        assert_eq!(err.to_string(), "Malformed version: not-a-version");
        assert!(Version::parse("").is_err());
    }

    #[test]
    fn keeps_original_text() {
        let v = Version::parse("1.2-rc.1+abc").unwrap();
        assert_eq!(v.original(), "1.2-rc.1+abc");
        assert_eq!(v.to_string(), "1.2.0-rc.1+abc");
    }
}
