//! Store addressing for configuration settings.
//!
//! Two schemes exist: a cluster-wide setting (`/cfgsync/v1/config/<name>`) and a
//! node-scoped override of the same setting (`/cfgsync/v1/host/<node>/config/<name>`).
//! Segments are escaped so the encoding is injective.

#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Root of every config path in the store.
pub const CONFIG_ROOT: &str = "/cfgsync/v1";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("not a config path: {0}")]
    NotConfigPath(String),
    #[error("empty segment in path: {0}")]
    EmptySegment(String),
    #[error("bad escape sequence in segment: {0}")]
    BadEscape(String),
}

/// Address of a single configuration setting in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ConfigKey {
    /// Cluster-wide value.
    Global { name: String },
    /// Override of `name` scoped to one node.
    PerNode { node: String, name: String },
}

impl ConfigKey {
    pub fn global(name: impl Into<String>) -> Self {
        ConfigKey::Global { name: name.into() }
    }

    pub fn per_node(node: impl Into<String>, name: impl Into<String>) -> Self {
        ConfigKey::PerNode { node: node.into(), name: name.into() }
    }

    /// Setting name regardless of scope.
    pub fn name(&self) -> &str {
        match self {
            ConfigKey::Global { name } | ConfigKey::PerNode { name, .. } => name,
        }
    }

    /// Node this key is scoped to; `None` for global keys.
    pub fn node(&self) -> Option<&str> {
        match self {
            ConfigKey::Global { .. } => None,
            ConfigKey::PerNode { node, .. } => Some(node),
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, ConfigKey::Global { .. })
    }

    /// Literal store path for this key.
    pub fn path(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigKey::Global { name } => write!(f, "{}/config/{}", CONFIG_ROOT, escape(name)),
            ConfigKey::PerNode { node, name } => {
                write!(f, "{}/host/{}/config/{}", CONFIG_ROOT, escape(node), escape(name))
            }
        }
    }
}

impl FromStr for ConfigKey {
    type Err = KeyError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let rest = path
            .strip_prefix(CONFIG_ROOT)
            .and_then(|r| r.strip_prefix('/'))
            .ok_or_else(|| KeyError::NotConfigPath(path.to_string()))?;
        let segs: Vec<&str> = rest.split('/').collect();
        if segs.iter().any(|s| s.is_empty()) {
            return Err(KeyError::EmptySegment(path.to_string()));
        }
        match segs.as_slice() {
            ["config", name] => Ok(ConfigKey::Global { name: unescape(name)? }),
            ["host", node, "config", name] => Ok(ConfigKey::PerNode { node: unescape(node)?, name: unescape(name)? }),
            _ => Err(KeyError::NotConfigPath(path.to_string())),
        }
    }
}

impl TryFrom<String> for ConfigKey {
    type Error = KeyError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ConfigKey> for String {
    fn from(k: ConfigKey) -> Self {
        k.to_string()
    }
}

fn escape(seg: &str) -> String {
    let mut out = String::with_capacity(seg.len());
    for c in seg.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(seg: &str) -> Result<String, KeyError> {
    let mut out = String::with_capacity(seg.len());
    let mut rest = seg;
    while let Some(i) = rest.find('%') {
        out.push_str(&rest[..i]);
        let code = rest.get(i + 1..i + 3).ok_or_else(|| KeyError::BadEscape(seg.to_string()))?;
        match code {
            "25" => out.push('%'),
            "2F" | "2f" => out.push('/'),
            _ => return Err(KeyError::BadEscape(seg.to_string())),
        }
        rest = &rest[i + 3..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_store_paths() {
        assert_eq!(ConfigKey::global("mtu").path(), "/cfgsync/v1/config/mtu");
        assert_eq!(ConfigKey::per_node("nodeA", "mtu").path(), "/cfgsync/v1/host/nodeA/config/mtu");
    }

    #[test]
    fn parses_paths_back() {
        let k: ConfigKey = "/cfgsync/v1/host/node-1/config/LogSeverityScreen".parse().unwrap();
        assert_eq!(k, ConfigKey::per_node("node-1", "LogSeverityScreen"));
        assert_eq!(k.node(), Some("node-1"));
        assert_eq!(k.name(), "LogSeverityScreen");
        let g: ConfigKey = "/cfgsync/v1/config/ClusterGUID".parse().unwrap();
        assert!(g.is_global());
    }

    #[test]
    fn slashes_in_segments_do_not_collide() {
        // Without escaping both would read /cfgsync/v1/host/a/config/b/config/x
        let a = ConfigKey::per_node("a/config/b", "x");
        let b = ConfigKey::per_node("a", "b/config/x");
        assert_ne!(a.path(), b.path());
        assert_eq!(a.path().parse::<ConfigKey>().unwrap(), a);
        assert_eq!(b.path().parse::<ConfigKey>().unwrap(), b);

        let pct = ConfigKey::global("50%2Fx");
        assert_eq!(pct.path(), "/cfgsync/v1/config/50%252Fx");
        assert_eq!(pct.path().parse::<ConfigKey>().unwrap(), pct);
    }

    #[test]
    fn rejects_foreign_paths() {
        assert!(matches!("/other/v1/config/x".parse::<ConfigKey>(), Err(KeyError::NotConfigPath(_))));
        assert!(matches!("/cfgsync/v1/host/n/x".parse::<ConfigKey>(), Err(KeyError::NotConfigPath(_))));
        assert!(matches!("/cfgsync/v1/config/".parse::<ConfigKey>(), Err(KeyError::EmptySegment(_))));
        assert!(matches!("/cfgsync/v1/config/a%zz".parse::<ConfigKey>(), Err(KeyError::BadEscape(_))));
    }

    #[test]
    fn serde_uses_path_string() {
        let k = ConfigKey::per_node("n1", "mtu");
        let s = serde_json::to_string(&k).unwrap();
        assert_eq!(s, "\"/cfgsync/v1/host/n1/config/mtu\"");
        let back: ConfigKey = serde_json::from_str(&s).unwrap();
        assert_eq!(back, k);
    }
}
