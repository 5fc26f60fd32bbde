use super::error::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use uuid::Uuid;

/// Content id the cluster reserves for its coordinator node.
pub const COORDINATOR_CONTENT_ID: i32 = -1;

/// One primary node of the cluster as reported by the segment configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentDescriptor {
    #[serde(default)]
    pub db_id: i32,
    pub content_id: i32,
    #[serde(default = "default_role")]
    pub role: String,
    pub port: u16,
    pub hostname: String,
    pub data_dir: String,
}

fn default_role() -> String {
    "p".to_string()
}

impl SegmentDescriptor {
    pub fn new(
        content_id: i32,
        hostname: impl Into<String>,
        port: u16,
        data_dir: impl Into<String>,
    ) -> Self {
        Self {
            db_id: content_id + 2,
            content_id,
            role: default_role(),
            port,
            hostname: hostname.into(),
            data_dir: data_dir.into(),
        }
    }

    pub fn is_coordinator(&self) -> bool {
        self.content_id == COORDINATOR_CONTENT_ID
    }
}

/// Immutable snapshot of the cluster's primaries, ordered by content id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterTopology {
    segments: Vec<SegmentDescriptor>,
}

impl ClusterTopology {
    /// Builds a topology, rejecting empty input and duplicate content ids.
    pub fn new(mut segments: Vec<SegmentDescriptor>) -> Result<Self> {
        if segments.is_empty() {
            return Err(BackupError::Config(
                "cluster topology must contain at least one segment".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for segment in &segments {
            if !seen.insert(segment.content_id) {
                return Err(BackupError::Config(format!(
                    "content id {} appears more than once in the cluster topology",
                    segment.content_id
                )));
            }
        }
        segments.sort_by_key(|segment| segment.content_id);
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[SegmentDescriptor] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn by_content(&self, content_id: i32) -> Option<&SegmentDescriptor> {
        self.segments
            .iter()
            .find(|segment| segment.content_id == content_id)
    }

    pub fn coordinator(&self) -> Option<&SegmentDescriptor> {
        self.by_content(COORDINATOR_CONTENT_ID)
    }

    pub fn content_ids(&self) -> Vec<i32> {
        self.segments.iter().map(|segment| segment.content_id).collect()
    }

    /// Segments targeted by a fan-out, optionally including the coordinator.
    pub fn targets(&self, include_coordinator: bool) -> Vec<&SegmentDescriptor> {
        self.segments
            .iter()
            .filter(|segment| include_coordinator || !segment.is_coordinator())
            .collect()
    }
}

/// Identifier attached to one segment's backup so it can be found again later.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentUserData {
    pub id: String,
}

impl SegmentUserData {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
        }
    }

    /// Wraps an identifier derived from a known backup name.
    pub fn from_id(backup_id: impl Into<String>) -> Result<Self> {
        let id = backup_id.into();
        if id.is_empty() {
            return Err(BackupError::Config(
                "segment user data id must not be empty".to_string(),
            ));
        }
        if id.chars().any(|c| c == '/' || c == '\\' || c.is_control()) {
            return Err(BackupError::Config(format!(
                "segment user data id {:?} is not a valid storage path component",
                id
            )));
        }
        Ok(Self { id })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// JSON encoding wrapped in double quotes, escaped so that exactly one
    /// round of POSIX shell tokenization yields the raw JSON again.
    pub fn quoted_string(&self) -> Result<String> {
        let json = self.to_json()?;
        let mut quoted = String::with_capacity(json.len() + 8);
        quoted.push('"');
        for c in json.chars() {
            if matches!(c, '"' | '\\' | '$' | '`') {
                quoted.push('\\');
            }
            quoted.push(c);
        }
        quoted.push('"');
        Ok(quoted)
    }

    /// Decodes the value a remote worker receives after shell tokenization.
    pub fn from_json(raw: &str) -> Result<Self> {
        let data: SegmentUserData = serde_json::from_str(raw)?;
        Self::from_id(data.id)
    }
}

impl Default for SegmentUserData {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SegmentUserData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// A flag forwarded verbatim to every remote invocation as `--name=value`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentFwdArg {
    pub name: String,
    pub value: String,
}

impl SegmentFwdArg {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Restore point position reported by every segment, keyed by content id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct RestoreLsnSet {
    lsns: BTreeMap<i32, String>,
}

impl RestoreLsnSet {
    pub(crate) fn from_map(lsns: BTreeMap<i32, String>) -> Self {
        Self { lsns }
    }

    pub fn get(&self, content_id: i32) -> Option<&str> {
        self.lsns.get(&content_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lsns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lsns.is_empty()
    }

    pub fn content_ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.lsns.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, &str)> + '_ {
        self.lsns.iter().map(|(id, lsn)| (*id, lsn.as_str()))
    }
}
