//! Version strings reported by runtime `--version` commands

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Semantic version as printed by a runtime (`v20.11.1`, `Python 3.11.4`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Option<String>,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: None,
        }
    }

    pub fn with_pre(mut self, pre: String) -> Self {
        self.pre = Some(pre);
        self
    }

    /// Find the first version-looking token in free-form command output
    pub fn extract(output: &str) -> Option<Self> {
        output
            .split_whitespace()
            .map(|token| token.trim_matches([',', '(', ')']))
            .map(|token| token.strip_prefix(['v', 'V']).unwrap_or(token))
            .find_map(|token| token.parse().ok())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // build metadata never affects ordering
        let main_part = s.split('+').next().ok_or(VersionError::InvalidFormat)?;

        let mut parts = main_part.splitn(2, '-');
        let version_part = parts.next().ok_or(VersionError::InvalidFormat)?;
        let pre_part = parts.next();

        let components: Vec<&str> = version_part.split('.').collect();
        if !(2..=3).contains(&components.len()) {
            return Err(VersionError::InvalidFormat);
        }

        let parse = |c: &str| c.parse::<u64>().map_err(|_| VersionError::InvalidNumber);
        let major = parse(components[0])?;
        let minor = parse(components[1])?;
        let patch = components
            .get(2)
            .map(|c| parse(*c))
            .transpose()?
            .unwrap_or(0);

        let mut version = Self::new(major, minor, patch);
        if let Some(pre) = pre_part {
            version = version.with_pre(pre.to_string());
        }

        Ok(version)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| match (&self.pre, &other.pre) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater, // Stable > pre-release
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error("Invalid version format")]
    InvalidFormat,

    #[error("Invalid version number")]
    InvalidNumber,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("v20.11.1\n", Version::new(20, 11, 1))]
    #[case("Python 3.11.4", Version::new(3, 11, 4))]
    #[case("v22.0.0-nightly2024", Version::new(22, 0, 0).with_pre("nightly2024".to_string()))]
    #[case("pip 24.0 from /usr/lib/pip (python 3.12)", Version::new(24, 0, 0))]
    fn test_extract(#[case] output: &str, #[case] expected: Version) {
        assert_eq!(Version::extract(output), Some(expected));
    }

    #[rstest]
    #[case("")]
    #[case("command not found")]
    #[case("Python")]
    fn test_extract_none(#[case] output: &str) {
        assert_eq!(Version::extract(output), None);
    }

    #[test]
    fn test_ordering() {
        let stable: Version = "3.11.4".parse().unwrap();
        let pre: Version = "3.11.4-rc1".parse().unwrap();

        assert!(stable > pre);
        assert!(Version::new(20, 0, 0) > Version::new(18, 19, 1));
        assert_eq!(stable.to_string(), "3.11.4");
    }
}
