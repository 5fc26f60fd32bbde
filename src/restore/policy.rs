use crate::config::VersionRange;
use crate::core::{BackupError, Result};

/// Outcome of a compatibility check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityVerdict {
    pub compatible: bool,
    pub reason: String,
}

impl CompatibilityVerdict {
    pub fn compatible(reason: impl Into<String>) -> Self {
        Self {
            compatible: true,
            reason: reason.into(),
        }
    }

    pub fn incompatible(reason: impl Into<String>) -> Self {
        Self {
            compatible: false,
            reason: reason.into(),
        }
    }
}

/// Decides whether a backup taken with one engine version can be restored
/// onto another.
pub trait CompatibilityPolicy: Send + Sync {
    fn check(&self, backup_version: &str, target_version: &str) -> CompatibilityVerdict;
}

/// `(major, minor)` of a dotted version such as `4.4.18` or `6.0`.
pub fn parse_major_minor(version: &str) -> Result<(u32, u32)> {
    let mut parts = version.trim().split('.');
    let mut component = |name: &str| -> Result<u32> {
        parts
            .next()
            .filter(|part| !part.is_empty())
            .ok_or_else(|| {
                BackupError::Config(format!("version '{}' has no {} component", version, name))
            })?
            .parse::<u32>()
            .map_err(|err| BackupError::Config(format!("version '{}': {}", version, err)))
    };
    let major = component("major")?;
    let minor = component("minor")?;
    Ok((major, minor))
}

/// Accepts a restore only onto the same `major.minor` the backup was taken with.
#[derive(Debug, Clone, Copy, Default)]
pub struct MajorMinorPolicy;

impl CompatibilityPolicy for MajorMinorPolicy {
    fn check(&self, backup_version: &str, target_version: &str) -> CompatibilityVerdict {
        let backup = match parse_major_minor(backup_version) {
            Ok(version) => version,
            Err(err) => return CompatibilityVerdict::incompatible(err.to_string()),
        };
        let target = match parse_major_minor(target_version) {
            Ok(version) => version,
            Err(err) => return CompatibilityVerdict::incompatible(err.to_string()),
        };
        if backup == target {
            CompatibilityVerdict::compatible(format!("both are {}.{}", backup.0, backup.1))
        } else {
            CompatibilityVerdict::incompatible(format!(
                "major.minor differs ({}.{} vs {}.{})",
                backup.0, backup.1, target.0, target.1
            ))
        }
    }
}

/// Target versions whose restore needs the log-recovery pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRepairPolicy {
    min: (u32, u32),
    max: (u32, u32),
}

impl LogRepairPolicy {
    pub fn new(range: &VersionRange) -> Result<Self> {
        let min = parse_major_minor(&range.min)?;
        let max = parse_major_minor(&range.max)?;
        if min > max {
            return Err(BackupError::Config(format!(
                "log repair range {}..={} is empty",
                range.min, range.max
            )));
        }
        Ok(Self { min, max })
    }

    pub fn need_fix_oplog(&self, target_version: &str) -> Result<bool> {
        let version = parse_major_minor(target_version)?;
        Ok(self.min <= version && version <= self.max)
    }
}
