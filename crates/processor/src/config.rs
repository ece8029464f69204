//! Generic config update processor.
//!
//! Composes a typed spec from flat setting entries for one scope (global, or a node layered
//! over global) and decomposes a typed resource back into entries. Stateless across calls;
//! the only shared state is the bound spec descriptor.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use cfgsync_core::{Annotations, ConfigKey, RawEntry, Resource, ResourceEvent, ResourceKey, Revision};
use cfgsync_schema::{BindError, ConfigSpec, ConversionError, SpecDescriptor};
use metrics::{counter, histogram};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::annotations::AnnotationPolicy;
use crate::scope::{Layer, ScopeStack};

/// Builds the per-node key for a setting.
pub type NodeKeyFn = fn(&str, &str) -> ConfigKey;
/// Builds the global key for a setting.
pub type GlobalKeyFn = fn(&str) -> ConfigKey;

/// Kind and naming of the resources a processor produces. Supplied by the owner of the
/// resource kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceIdentity {
    pub kind: &'static str,
    pub api_version: &'static str,
    /// Name of the cluster-wide resource.
    pub global_name: &'static str,
    /// Node-scoped resources are named `node_prefix + node`.
    pub node_prefix: &'static str,
}

impl ResourceIdentity {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            api_version: cfgsync_apis::GROUP_VERSION_CURRENT,
            global_name: cfgsync_apis::GLOBAL_RESOURCE_NAME,
            node_prefix: cfgsync_apis::NODE_RESOURCE_PREFIX,
        }
    }

    pub fn resource_name(&self, layer: &Layer) -> String {
        match layer {
            Layer::Global => self.global_name.to_string(),
            Layer::Node(n) => format!("{}{}", self.node_prefix, n),
        }
    }

    /// Inverse of [`resource_name`](Self::resource_name).
    pub fn layer_of(&self, name: &str) -> Option<Layer> {
        if name == self.global_name {
            return Some(Layer::Global);
        }
        name.strip_prefix(self.node_prefix).filter(|n| !n.is_empty()).map(|n| Layer::Node(n.to_string()))
    }

    pub fn resource_key(&self, layer: &Layer) -> ResourceKey {
        ResourceKey { kind: self.kind.to_string(), name: self.resource_name(layer), namespace: None }
    }
}

/// A setting whose value could not be converted. The field it targets is left unset.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{key}: {error}")]
pub struct ConversionDiagnostic {
    pub key: ConfigKey,
    pub error: ConversionError,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecomposeError {
    #[error("resource kind {found:?} does not match processor kind {expected:?}")]
    KindMismatch { expected: &'static str, found: String },
    #[error("resource name {0:?} is neither the global name nor a node-scoped name")]
    UnrecognizedName(String),
    #[error("resourceVersion {0:?} is not a store revision")]
    InvalidRevision(String),
}

/// Events plus per-field diagnostics from one processed batch.
#[derive(Debug, Clone)]
pub struct ProcessOutcome<S> {
    pub events: Vec<ResourceEvent<S>>,
    pub diagnostics: Vec<ConversionDiagnostic>,
}

impl<S> Default for ProcessOutcome<S> {
    fn default() -> Self {
        Self { events: Vec::new(), diagnostics: Vec::new() }
    }
}

impl<S> ProcessOutcome<S> {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

pub struct ConfigUpdateProcessor<S> {
    descriptor: Arc<SpecDescriptor<S>>,
    policy: AnnotationPolicy,
    node_key: NodeKeyFn,
    global_key: GlobalKeyFn,
    identity: ResourceIdentity,
}

impl<S: ConfigSpec> ConfigUpdateProcessor<S> {
    /// Bind `S` and build a processor. Fails only when the spec's field table is invalid.
    pub fn new(
        policy: AnnotationPolicy,
        node_key: NodeKeyFn,
        global_key: GlobalKeyFn,
        identity: ResourceIdentity,
    ) -> Result<Self, BindError> {
        let descriptor = cfgsync_schema::bind::<S>()?;
        Ok(Self { descriptor, policy, node_key, global_key, identity })
    }

    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    pub fn policy(&self) -> AnnotationPolicy {
        self.policy
    }

    /// Whether entries for `key` can affect this processor's resources.
    pub fn handles(&self, key: &ConfigKey) -> bool {
        self.descriptor.contains(key.name())
    }

    /// Compose the view of `scope_node` (or the global view) from `entries`.
    ///
    /// Emits one `Updated` event when any bound setting in scope has a value, one `Deleted`
    /// event when every in-scope entry for a bound setting is a deletion, and nothing when no
    /// entry is in scope. The result does not depend on the order of `entries`.
    pub fn process_updates(&self, entries: &[RawEntry], scope_node: Option<&str>) -> ProcessOutcome<S> {
        let stack = ScopeStack::for_node(scope_node);
        counter!("processor_batches_total", 1u64, "kind" => self.identity.kind);
        histogram!("processor_batch_entries", entries.len() as f64);

        // Per layer: setting name -> winning entry for that key.
        let mut layers: SmallVec<[FxHashMap<&str, &RawEntry>; 2]> =
            stack.layers().iter().map(|_| FxHashMap::default()).collect();
        let mut revision: Revision = 0;
        let mut in_scope = false;
        for e in entries {
            let Some(rank) = stack.rank(&e.key) else { continue };
            if !self.descriptor.contains(e.key.name()) {
                continue;
            }
            in_scope = true;
            revision = revision.max(e.revision);
            let slot = layers[rank].entry(e.key.name()).or_insert(e);
            if supersedes(e, slot) {
                *slot = e;
            }
        }
        if !in_scope {
            return ProcessOutcome::default();
        }

        let mut spec = S::default();
        let mut diagnostics = Vec::new();
        let mut selected: Vec<(usize, &RawEntry)> = Vec::new();
        for f in self.descriptor.fields() {
            let setting = f.setting();
            let chosen = layers
                .iter()
                .enumerate()
                .find_map(|(rank, l)| l.get(setting).filter(|e| e.value.is_some()).map(|e| (rank, *e)));
            let Some((rank, entry)) = chosen else { continue };
            let raw = entry.value.as_deref().unwrap_or_default();
            if let Err(error) = self.descriptor.apply(&mut spec, setting, raw) {
                warn!(key = %entry.key, error = %error, "config value not converted; field left unset");
                counter!("processor_conversion_errors_total", 1u64, "kind" => self.identity.kind);
                diagnostics.push(ConversionDiagnostic { key: entry.key.clone(), error });
            }
            selected.push((rank, entry));
        }

        let target = stack.target();
        let event = if selected.is_empty() {
            ResourceEvent::Deleted { key: self.identity.resource_key(target), revision }
        } else {
            ResourceEvent::Updated { resource: self.compose(target, spec, &selected, revision) }
        };
        debug!(
            kind = self.identity.kind,
            scope = %stack,
            entries = entries.len(),
            settings = selected.len(),
            diagnostics = diagnostics.len(),
            "processed config batch"
        );
        ProcessOutcome { events: vec![event], diagnostics }
    }

    fn compose(&self, target: &Layer, spec: S, selected: &[(usize, &RawEntry)], revision: Revision) -> Resource<S> {
        // Least specific layer first so more specific annotations overwrite.
        let mut ordered: Vec<&(usize, &RawEntry)> = selected.iter().collect();
        ordered.sort_by(|a, b| b.0.cmp(&a.0));
        let mut merged = Annotations::new();
        for (_, e) in ordered {
            merged.extend(e.annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        let annotations = self.policy.apply(&merged);

        let mut res: Resource<S> = Resource::new(self.identity.kind, self.identity.api_version);
        res.metadata.name = Some(self.identity.resource_name(target));
        res.metadata.resource_version = Some(revision.to_string());
        res.metadata.annotations = if annotations.is_empty() { None } else { Some(annotations) };
        res.spec = spec;
        res
    }

    /// Split `resource` back into one entry per set field, keyed by the resource's scope.
    ///
    /// Unset fields produce no entry; a field set to its zero value does. The resource keeps
    /// only one `resourceVersion` and one merged annotation map, so every emitted entry
    /// carries that revision (0 when absent) and the policy-filtered annotations. Entries that
    /// were composed from differing revisions or annotations come back with those values
    /// flattened; values and keys round-trip exactly.
    pub fn decompose(&self, resource: &Resource<S>) -> Result<Vec<RawEntry>, DecomposeError> {
        if resource.type_meta.kind != self.identity.kind {
            return Err(DecomposeError::KindMismatch { expected: self.identity.kind, found: resource.type_meta.kind.clone() });
        }
        let layer = self
            .identity
            .layer_of(resource.name())
            .ok_or_else(|| DecomposeError::UnrecognizedName(resource.name().to_string()))?;
        let revision = match resource.metadata.resource_version.as_deref() {
            None | Some("") => 0,
            Some(rv) => rv.parse().map_err(|_| DecomposeError::InvalidRevision(rv.to_string()))?,
        };
        let annotations = resource.annotations().map(|a| self.policy.apply(a)).unwrap_or_default();

        Ok(self
            .descriptor
            .extract(&resource.spec)
            .into_iter()
            .map(|(setting, value)| {
                let key = match &layer {
                    Layer::Global => (self.global_key)(setting),
                    Layer::Node(node) => (self.node_key)(node, setting),
                };
                RawEntry { key, value: Some(value), revision, annotations: annotations.clone() }
            })
            .collect())
    }
}

impl<S> fmt::Debug for ConfigUpdateProcessor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigUpdateProcessor")
            .field("identity", &self.identity)
            .field("policy", &self.policy)
            .field("fields", &self.descriptor.fields())
            .finish()
    }
}

/// Total order between two entries for the same key: higher revision wins, then the larger
/// value and annotations, so the winner never depends on arrival order.
fn supersedes(a: &RawEntry, b: &RawEntry) -> bool {
    (a.revision, &a.value, &a.annotations).cmp(&(b.revision, &b.value, &b.annotations)) == Ordering::Greater
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::updateprocessors::{global_config_key, host_config_key};
    use cfgsync_schema::FieldDecl;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct NetSpec {
        mtu: Option<u32>,
        mode: Option<String>,
        ready: Option<bool>,
    }

    impl ConfigSpec for NetSpec {
        const KIND: &'static str = "NetConfig";
        fn fields() -> Vec<FieldDecl<Self>> {
            vec![
                FieldDecl::integer("mtu", "mtu", 0, 65535, |s| s.mtu.map(i64::from), |s, v| s.mtu = u32::try_from(v).ok()),
                FieldDecl::text("mode", "mode", |s| s.mode.as_deref(), |s, v| s.mode = Some(v)),
                FieldDecl::boolean("ready", "ready", |s| s.ready, |s, v| s.ready = Some(v)),
            ]
        }
    }

    fn processor(policy: AnnotationPolicy) -> ConfigUpdateProcessor<NetSpec> {
        ConfigUpdateProcessor::new(policy, host_config_key, global_config_key, ResourceIdentity::new("NetConfig"))
            .unwrap()
    }

    fn updated(out: &ProcessOutcome<NetSpec>) -> &Resource<NetSpec> {
        match out.events.as_slice() {
            [ResourceEvent::Updated { resource }] => resource,
            other => panic!("expected one update, got {other:?}"),
        }
    }

    fn g(name: &str, v: &str, rev: u64) -> RawEntry {
        RawEntry::new(ConfigKey::global(name), v, rev)
    }

    fn n(node: &str, name: &str, v: &str, rev: u64) -> RawEntry {
        RawEntry::new(ConfigKey::per_node(node, name), v, rev)
    }

    #[test]
    fn node_override_wins_for_its_node_only() {
        let p = processor(AnnotationPolicy::Disallow);
        let entries = vec![g("mtu", "1500", 1), n("nodeA", "mtu", "9000", 2)];

        let a = p.process_updates(&entries, Some("nodeA"));
        assert_eq!(updated(&a).spec.mtu, Some(9000));
        assert_eq!(updated(&a).name(), "node.nodeA");

        let b = p.process_updates(&entries, Some("nodeB"));
        assert_eq!(updated(&b).spec.mtu, Some(1500));
        assert_eq!(updated(&b).name(), "node.nodeB");

        let global = p.process_updates(&entries, None);
        assert_eq!(updated(&global).spec.mtu, Some(1500));
        assert_eq!(updated(&global).name(), "default");
    }

    #[test]
    fn global_only_settings_are_scope_independent() {
        let p = processor(AnnotationPolicy::Disallow);
        let entries = vec![g("mode", "vxlan", 3), g("ready", "true", 4)];
        let specs: Vec<NetSpec> = [None, Some(""), Some("nodeA"), Some("nodeZ")]
            .into_iter()
            .map(|s| updated(&p.process_updates(&entries, s)).spec.clone())
            .collect();
        for s in &specs {
            assert_eq!(s, &NetSpec { mtu: None, mode: Some("vxlan".into()), ready: Some(true) });
        }
    }

    #[test]
    fn bad_value_degrades_one_field() {
        let p = processor(AnnotationPolicy::Disallow);
        let out = p.process_updates(&[g("mtu", "bad", 1), g("mode", "ipip", 1)], None);
        let r = updated(&out);
        assert_eq!(r.spec.mtu.unwrap_or_default(), 0);
        assert_eq!(r.spec.mtu, None);
        assert_eq!(r.spec.mode.as_deref(), Some("ipip"));
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].key, ConfigKey::global("mtu"));
    }

    #[test]
    fn unknown_settings_are_ignored() {
        let p = processor(AnnotationPolicy::Disallow);
        assert!(p.process_updates(&[g("FromTheFuture", "1", 1)], None).is_empty());
        let out = p.process_updates(&[g("FromTheFuture", "1", 1), g("mode", "x", 2)], None);
        assert_eq!(updated(&out).spec.mode.as_deref(), Some("x"));
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn all_deletions_emit_delete() {
        let p = processor(AnnotationPolicy::Disallow);
        let out = p.process_updates(
            &[RawEntry::tombstone(ConfigKey::per_node("nodeA", "mtu"), 7), RawEntry::tombstone(ConfigKey::per_node("nodeA", "mode"), 5)],
            Some("nodeA"),
        );
        assert_eq!(
            out.events,
            vec![ResourceEvent::Deleted {
                key: ResourceKey { kind: "NetConfig".into(), name: "node.nodeA".into(), namespace: None },
                revision: 7,
            }]
        );
    }

    #[test]
    fn deleted_override_falls_back_to_global() {
        let p = processor(AnnotationPolicy::Disallow);
        let entries = vec![g("mtu", "1500", 1), RawEntry::tombstone(ConfigKey::per_node("nodeA", "mtu"), 9)];
        let out = p.process_updates(&entries, Some("nodeA"));
        let r = updated(&out);
        assert_eq!(r.spec.mtu, Some(1500));
        assert_eq!(r.metadata.resource_version.as_deref(), Some("9"));
    }

    #[test]
    fn out_of_scope_batch_is_empty() {
        let p = processor(AnnotationPolicy::Disallow);
        assert!(p.process_updates(&[n("nodeB", "mtu", "1", 1)], Some("nodeA")).is_empty());
        assert!(p.process_updates(&[], None).is_empty());
    }

    #[test]
    fn arrival_order_does_not_matter() {
        let p = processor(AnnotationPolicy::Allow);
        let mut entries = vec![
            g("mtu", "1500", 1),
            n("nodeA", "mtu", "9000", 2),
            n("nodeA", "mtu", "8000", 2),
            g("mode", "vxlan", 1).with_annotation("team", "a"),
            n("nodeA", "mode", "ipip", 3).with_annotation("team", "b"),
            g("ready", "yes", 4),
        ];
        let first = updated(&p.process_updates(&entries, Some("nodeA"))).clone();
        for _ in 0..entries.len() {
            entries.rotate_left(1);
            assert_eq!(updated(&p.process_updates(&entries, Some("nodeA"))), &first);
        }
        entries.reverse();
        assert_eq!(updated(&p.process_updates(&entries, Some("nodeA"))), &first);
        assert_eq!(first.spec.mtu, Some(9000));
        assert_eq!(first.annotations().unwrap()["team"], "b");
    }

    #[test]
    fn annotation_policy_is_applied() {
        let entries = vec![g("mode", "vxlan", 1).with_annotation("k", "global"), n("nodeA", "mtu", "9000", 2).with_annotation("x", "y")];
        let denied = processor(AnnotationPolicy::Disallow).process_updates(&entries, Some("nodeA"));
        assert!(updated(&denied).annotations().is_none());

        let allowed = processor(AnnotationPolicy::Allow).process_updates(&entries, Some("nodeA"));
        let a = updated(&allowed).annotations().unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a["k"], "global");
        assert_eq!(a["x"], "y");
    }

    #[test]
    fn decompose_reproduces_scoped_entries() {
        let p = processor(AnnotationPolicy::Disallow);
        let entries = vec![g("mtu", "1500", 4), g("mode", "vxlan", 2), g("ready", "false", 3)];
        let out = p.process_updates(&entries, None);
        let mut back = p.decompose(updated(&out)).unwrap();
        back.sort_by(|a, b| a.key.cmp(&b.key));
        // Per-entry revisions collapse to the resource's resourceVersion (the max, 4).
        let mut want: Vec<RawEntry> = entries.into_iter().map(|e| RawEntry { revision: 4, ..e }).collect();
        want.sort_by(|a, b| a.key.cmp(&b.key));
        assert_eq!(back, want);
    }

    #[test]
    fn decompose_flattens_revisions_and_annotations() {
        let p = processor(AnnotationPolicy::Allow);
        let out = p.process_updates(
            &[g("mtu", "1500", 2).with_annotation("a", "1"), g("mode", "vxlan", 6).with_annotation("b", "2")],
            None,
        );
        let back = p.decompose(updated(&out)).unwrap();
        assert_eq!(back.len(), 2);
        for e in &back {
            assert_eq!(e.revision, 6);
            assert_eq!(e.annotations.len(), 2);
            assert_eq!(e.annotations["a"], "1");
            assert_eq!(e.annotations["b"], "2");
        }
        let values: Vec<_> = back.iter().map(|e| (e.key.name(), e.value.as_deref())).collect();
        assert_eq!(values, vec![("mtu", Some("1500")), ("mode", Some("vxlan"))]);
    }

    #[test]
    fn decompose_uses_node_keys_for_node_resources() {
        let p = processor(AnnotationPolicy::Disallow);
        let mut r: Resource<NetSpec> = Resource::new("NetConfig", cfgsync_apis::GROUP_VERSION_CURRENT);
        r.metadata.name = Some("node.nodeA".into());
        r.spec.mtu = Some(0);
        let entries = p.decompose(&r).unwrap();
        assert_eq!(entries, vec![RawEntry::new(ConfigKey::per_node("nodeA", "mtu"), "0", 0)]);
    }

    #[test]
    fn decompose_rejects_foreign_resources() {
        let p = processor(AnnotationPolicy::Disallow);
        let mut r: Resource<NetSpec> = Resource::new("Other", cfgsync_apis::GROUP_VERSION_CURRENT);
        r.metadata.name = Some("default".into());
        assert!(matches!(p.decompose(&r), Err(DecomposeError::KindMismatch { .. })));

        r.type_meta.kind = "NetConfig".into();
        r.metadata.name = Some("node.".into());
        assert_eq!(p.decompose(&r), Err(DecomposeError::UnrecognizedName("node.".into())));

        r.metadata.name = Some("default".into());
        r.metadata.resource_version = Some("abc".into());
        assert_eq!(p.decompose(&r), Err(DecomposeError::InvalidRevision("abc".into())));
    }
}
