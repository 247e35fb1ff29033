//! Dotted numeric versions and the signature version gate.

use super::meta::SignatureMeta;
use super::SignatureError;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A `major.minor[.patch...]` version. Anything after the first `-` is ignored.
///
/// Missing trailing components compare as zero, so `1.0 == 1.0.0`.
#[derive(Debug, Clone)]
pub struct DottedVersion(Vec<u64>);

impl DottedVersion {
    pub fn components(&self) -> &[u64] {
        &self.0
    }

    fn component(&self, idx: usize) -> u64 {
        self.0.get(idx).copied().unwrap_or(0)
    }
}

impl FromStr for DottedVersion {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SignatureError::InvalidVersion {
            value: s.to_string(),
        };
        let release = s.split('-').next().unwrap_or_default().trim();
        if release.is_empty() {
            return Err(invalid());
        }
        release
            .split('.')
            .map(|part| part.parse::<u64>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()
            .map(DottedVersion)
    }
}

impl fmt::Display for DottedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u64::to_string).collect();
        f.write_str(&parts.join("."))
    }
}

impl Ord for DottedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for DottedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DottedVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DottedVersion {}

/// Result of checking a signature's bounds against the running version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionGate {
    Compatible,
    /// Running version is below the signature's minimum.
    TooOld { minimum: String },
    /// Running version is above the signature's maximum.
    TooNew { maximum: String },
    /// A bound (or the running version) does not parse.
    Invalid { value: String },
}

impl VersionGate {
    pub fn is_compatible(&self) -> bool {
        matches!(self, VersionGate::Compatible)
    }
}

/// A declared bound; blank strings count as no bound.
fn bound(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Check `meta.minimum`/`meta.maximum` against `running`.
pub fn check_version(running: &str, meta: &SignatureMeta) -> VersionGate {
    let minimum = bound(&meta.minimum);
    let maximum = bound(&meta.maximum);
    if minimum.is_none() && maximum.is_none() {
        return VersionGate::Compatible;
    }

    let Ok(current) = running.parse::<DottedVersion>() else {
        return VersionGate::Invalid {
            value: running.to_string(),
        };
    };

    if let Some(minimum) = minimum {
        match minimum.parse::<DottedVersion>() {
            Ok(min) if current < min => {
                return VersionGate::TooOld {
                    minimum: minimum.to_string(),
                }
            }
            Ok(_) => {}
            Err(_) => {
                return VersionGate::Invalid {
                    value: minimum.to_string(),
                }
            }
        }
    }

    if let Some(maximum) = maximum {
        match maximum.parse::<DottedVersion>() {
            Ok(max) if current > max => {
                return VersionGate::TooNew {
                    maximum: maximum.to_string(),
                }
            }
            Ok(_) => {}
            Err(_) => {
                return VersionGate::Invalid {
                    value: maximum.to_string(),
                }
            }
        }
    }

    VersionGate::Compatible
}
