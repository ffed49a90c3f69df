use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const BUNDLED_PRESETS: &str = include_str!("presets.json");

const WILDCARD: &str = "*";
const HOST_ONLY: &str = "";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DomainStatus {
    Undefined,
    Disabled,
    Enabled,
    Blocked,
}

impl DomainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainStatus::Undefined => "undefined",
            DomainStatus::Disabled => "disabled",
            DomainStatus::Enabled => "enabled",
            DomainStatus::Blocked => "blocked",
        }
    }
}

impl TryFrom<u8> for DomainStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DomainStatus::Undefined),
            1 => Ok(DomainStatus::Disabled),
            2 => Ok(DomainStatus::Enabled),
            3 => Ok(DomainStatus::Blocked),
            other => Err(format!("unknown domain status {other}")),
        }
    }
}

impl From<DomainStatus> for u8 {
    fn from(status: DomainStatus) -> Self {
        match status {
            DomainStatus::Undefined => 0,
            DomainStatus::Disabled => 1,
            DomainStatus::Enabled => 2,
            DomainStatus::Blocked => 3,
        }
    }
}

/// One node of the preset tree. Branch keys are either host labels, paths
/// (starting with `/`), the host-only key `""` or the wildcard `*`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PresetNode {
    Status(DomainStatus),
    Branch(BTreeMap<String, PresetNode>),
}

/// Built-in classification keyed by reversed host labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresetTree {
    root: BTreeMap<String, PresetNode>,
}

impl PresetTree {
    pub fn bundled() -> Result<Self> {
        Self::from_json(BUNDLED_PRESETS).context("bundled presets are malformed")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("failed to parse preset tree")
    }

    pub fn empty() -> Self {
        Self {
            root: BTreeMap::new(),
        }
    }

    /// Most specific preset for `host` + `path`.
    ///
    /// A terminal status on the way down applies to the host and every
    /// subdomain. Path entries only count when the walk consumed every host
    /// label; otherwise the deepest `*` seen wins.
    pub fn resolve(&self, host: &str, path: &str) -> DomainStatus {
        let mut node = &self.root;
        let mut wildcard = wildcard_of(node);
        let mut exact = true;

        for label in host.trim_end_matches('.').rsplit('.') {
            if label == WILDCARD || label == HOST_ONLY || label.starts_with('/') {
                exact = false;
                break;
            }
            match node.get(label) {
                Some(PresetNode::Status(status)) => return *status,
                Some(PresetNode::Branch(child)) => {
                    node = child;
                    if let Some(status) = wildcard_of(node) {
                        wildcard = Some(status);
                    }
                }
                None => {
                    exact = false;
                    break;
                }
            }
        }

        if exact {
            if let Some(status) = path_status(node, path) {
                return status;
            }
            if let Some(PresetNode::Status(status)) = node.get(HOST_ONLY) {
                return *status;
            }
        }

        wildcard.unwrap_or(DomainStatus::Undefined)
    }
}

fn wildcard_of(node: &BTreeMap<String, PresetNode>) -> Option<DomainStatus> {
    match node.get(WILDCARD) {
        Some(PresetNode::Status(status)) => Some(*status),
        _ => None,
    }
}

/// Longest path key that equals `path` or is a segment prefix of it.
fn path_status(node: &BTreeMap<String, PresetNode>, path: &str) -> Option<DomainStatus> {
    node.iter()
        .filter_map(|(key, child)| match child {
            PresetNode::Status(status) if key.starts_with('/') => Some((key, *status)),
            _ => None,
        })
        .filter(|(key, _)| {
            let key = key.trim_end_matches('/');
            path == key
                || path.strip_prefix(key).is_some_and(|rest| rest.starts_with('/'))
                || (key.is_empty() && path == "/")
        })
        .max_by_key(|(key, _)| key.len())
        .map(|(_, status)| status)
}
