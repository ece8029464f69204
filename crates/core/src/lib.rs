//! cfgsync core types: store keys, raw entries and the typed resource envelope.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

pub mod key;

pub use key::{ConfigKey, KeyError};

/// Annotation map carried by raw entries and resource metadata.
pub type Annotations = BTreeMap<String, String>;

/// Modification revision reported by the store.
pub type Revision = u64;

/// A single key/value record observed in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    pub key: ConfigKey,
    /// `None` marks a deletion observed for `key`.
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub revision: Revision,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: Annotations,
}

impl RawEntry {
    pub fn new(key: ConfigKey, value: impl Into<String>, revision: Revision) -> Self {
        Self { key, value: Some(value.into()), revision, annotations: Annotations::new() }
    }

    /// Deletion marker for `key`.
    pub fn tombstone(key: ConfigKey, revision: Revision) -> Self {
        Self { key, value: None, revision, annotations: Annotations::new() }
    }

    pub fn with_annotation(mut self, k: impl Into<String>, v: impl Into<String>) -> Self {
        self.annotations.insert(k.into(), v.into());
        self
    }

    pub fn is_deletion(&self) -> bool {
        self.value.is_none()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChangeKind {
    Applied,
    Deleted,
}

/// Change notification delivered by the store watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawChange {
    pub kind: ChangeKind,
    pub entry: RawEntry,
}

impl RawChange {
    pub fn applied(entry: RawEntry) -> Self {
        Self { kind: ChangeKind::Applied, entry }
    }

    pub fn deleted(key: ConfigKey, revision: Revision) -> Self {
        Self { kind: ChangeKind::Deleted, entry: RawEntry::tombstone(key, revision) }
    }

    /// Entry as the processor sees it: deletions always carry no value.
    pub fn into_entry(self) -> RawEntry {
        match self.kind {
            ChangeKind::Applied => self.entry,
            ChangeKind::Deleted => RawEntry { value: None, ..self.entry },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeMeta {
    pub kind: String,
    pub api_version: String,
}

impl TypeMeta {
    pub fn new(kind: &str, api_version: &str) -> Self {
        Self { kind: kind.to_string(), api_version: api_version.to_string() }
    }
}

/// Typed resource: identity metadata plus a spec payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource<S> {
    #[serde(flatten)]
    pub type_meta: TypeMeta,
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: S,
}

impl<S: Default> Resource<S> {
    /// Zero-valued resource stamped with `kind` and `api_version`.
    pub fn new(kind: &str, api_version: &str) -> Self {
        Self { type_meta: TypeMeta::new(kind, api_version), metadata: ObjectMeta::default(), spec: S::default() }
    }
}

impl<S> Resource<S> {
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or("")
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey {
            kind: self.type_meta.kind.clone(),
            name: self.name().to_string(),
            namespace: self.metadata.namespace.clone(),
        }
    }

    pub fn annotations(&self) -> Option<&Annotations> {
        self.metadata.annotations.as_ref()
    }
}

/// Identity of a typed resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Output of an update processor for one resource identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ResourceEvent<S> {
    Updated { resource: Resource<S> },
    Deleted { key: ResourceKey, revision: Revision },
}

impl<S> ResourceEvent<S> {
    pub fn key(&self) -> ResourceKey {
        match self {
            ResourceEvent::Updated { resource } => resource.key(),
            ResourceEvent::Deleted { key, .. } => key.clone(),
        }
    }
}

pub mod prelude {
    pub use super::{
        Annotations, ChangeKind, ConfigKey, RawChange, RawEntry, Resource, ResourceEvent, ResourceKey, Revision,
        TypeMeta,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Spec {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mtu: Option<u32>,
    }

    #[test]
    fn deleted_change_drops_value() {
        let mut ch = RawChange::applied(RawEntry::new(ConfigKey::global("mtu"), "1500", 4));
        ch.kind = ChangeKind::Deleted;
        let e = ch.into_entry();
        assert!(e.is_deletion());
        assert_eq!(e.revision, 4);
    }

    #[test]
    fn resource_serializes_flat_type_meta() {
        let mut r: Resource<Spec> = Resource::new("ClusterInformation", "config.cfgsync.dev/v2");
        r.metadata.name = Some("default".into());
        r.spec.mtu = Some(1500);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["kind"], "ClusterInformation");
        assert_eq!(v["apiVersion"], "config.cfgsync.dev/v2");
        assert_eq!(v["metadata"]["name"], "default");
        assert_eq!(v["spec"]["mtu"], 1500);
        let back: Resource<Spec> = serde_json::from_value(v).unwrap();
        assert_eq!(back, r);
        assert_eq!(back.key().name, "default");
    }

    #[test]
    fn raw_entry_reads_minimal_json() {
        let e: RawEntry = serde_json::from_str(r#"{"key":"/cfgsync/v1/config/mtu","value":"1500"}"#).unwrap();
        assert_eq!(e.key, ConfigKey::global("mtu"));
        assert_eq!(e.revision, 0);
        assert!(e.annotations.is_empty());
    }
}
