//! cfgsync store: coalescing ingest of raw store changes and per-scope resource views.
//!
//! The [`ViewBuilder`] keeps the current raw entry set and re-runs an update processor for
//! every scope a batch touches. [`spawn_sync`] wraps it in an ingest loop that publishes
//! events, snapshots and an epoch counter.

#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use cfgsync_core::{ConfigKey, RawChange, RawEntry, Resource, ResourceEvent, ResourceKey, Revision};
use cfgsync_processor::{Layer, UpdateProcessor};
use metrics::{counter, histogram};
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Ingest tuning, read from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Capacity of the change/event channels and of the coalescing queue.
    pub queue_cap: usize,
    /// How often coalesced changes are applied.
    pub flush_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { queue_cap: 1024, flush_interval: Duration::from_millis(8) }
    }
}

impl SyncConfig {
    /// `CFGSYNC_QUEUE_CAP` and `CFGSYNC_FLUSH_MS`; unset or unparsable values keep defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        let queue_cap = std::env::var("CFGSYNC_QUEUE_CAP").ok().and_then(|s| s.parse().ok()).filter(|&c| c > 0).unwrap_or(d.queue_cap);
        let flush_interval = std::env::var("CFGSYNC_FLUSH_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(d.flush_interval);
        Self { queue_cap, flush_interval }
    }
}

/// Coalescing queue keyed by store key with FIFO order and fixed capacity.
pub struct Coalescer {
    map: FxHashMap<ConfigKey, RawChange>,
    order: VecDeque<ConfigKey>,
    cap: usize,
    dropped: u64,
}

impl Coalescer {
    pub fn with_capacity(cap: usize) -> Self {
        Self { map: FxHashMap::default(), order: VecDeque::new(), cap: cap.max(1), dropped: 0 }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Queue `c`. A pending change for the same key is replaced unless it carries a higher
    /// revision. When full, the oldest key is dropped.
    pub fn push(&mut self, c: RawChange) {
        if let Some(pending) = self.map.get_mut(&c.entry.key) {
            if pending.entry.revision > c.entry.revision {
                debug!(key = %c.entry.key, revision = c.entry.revision, "older change coalesced away");
            } else {
                *pending = c;
            }
            return;
        }
        if self.order.len() >= self.cap {
            if let Some(old) = self.order.pop_front() {
                warn!(key = %old, "coalescer full; dropping oldest pending change");
                self.map.remove(&old);
                self.dropped += 1;
                counter!("sync_coalesced_dropped_total", 1u64);
            }
        }
        self.order.push_back(c.entry.key.clone());
        self.map.insert(c.entry.key.clone(), c);
    }

    /// Drain all pending changes in first-seen order.
    pub fn drain_ready(&mut self) -> Vec<RawChange> {
        let mut out = Vec::with_capacity(self.order.len());
        while let Some(key) = self.order.pop_front() {
            if let Some(c) = self.map.remove(&key) {
                out.push(c);
            }
        }
        out
    }
}

/// Frozen view of every resource the builder currently holds.
#[derive(Debug, Clone)]
pub struct SyncSnapshot<S> {
    pub epoch: u64,
    pub resources: Vec<Resource<S>>,
}

impl<S> Default for SyncSnapshot<S> {
    fn default() -> Self {
        Self { epoch: 0, resources: Vec::new() }
    }
}

impl<S> SyncSnapshot<S> {
    pub fn get(&self, name: &str) -> Option<&Resource<S>> {
        self.resources.iter().find(|r| r.name() == name)
    }
}

/// Keeps the raw entry set and the resources derived from it.
///
/// The global view is maintained whenever global entries exist; a node view is maintained
/// while the node has at least one override.
pub struct ViewBuilder<P: UpdateProcessor> {
    processor: Arc<P>,
    entries: FxHashMap<ConfigKey, RawEntry>,
    /// Revision of the last deletion seen per key, so older writes stay deleted.
    deleted: FxHashMap<ConfigKey, Revision>,
    resources: BTreeMap<ResourceKey, Resource<P::Spec>>,
    epoch: u64,
}

impl<P> ViewBuilder<P>
where
    P: UpdateProcessor,
    P::Spec: Clone + PartialEq,
{
    pub fn new(processor: Arc<P>) -> Self {
        Self {
            processor,
            entries: FxHashMap::default(),
            deleted: FxHashMap::default(),
            resources: BTreeMap::new(),
            epoch: 0,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Apply a batch of changes and return the events for every resource that changed.
    pub fn apply(&mut self, batch: Vec<RawChange>) -> Vec<ResourceEvent<P::Spec>> {
        let started = std::time::Instant::now();
        let mut global_touched = false;
        let mut nodes_touched: BTreeSet<String> = BTreeSet::new();
        let mut tombstones: Vec<RawEntry> = Vec::new();
        for c in batch {
            let entry = c.into_entry();
            if !self.processor.handles(&entry.key) {
                continue;
            }
            let seen =
                self.entries.get(&entry.key).map(|cur| cur.revision).or_else(|| self.deleted.get(&entry.key).copied());
            if seen.is_some_and(|rev| rev > entry.revision) {
                debug!(key = %entry.key, revision = entry.revision, "ignoring stale change");
                continue;
            }
            match entry.key.node() {
                None => global_touched = true,
                Some(n) => {
                    nodes_touched.insert(n.to_string());
                }
            }
            tombstones.retain(|t| t.key != entry.key);
            if entry.is_deletion() {
                self.entries.remove(&entry.key);
                self.deleted.insert(entry.key.clone(), entry.revision);
                tombstones.push(entry);
            } else {
                self.deleted.remove(&entry.key);
                self.entries.insert(entry.key.clone(), entry);
            }
        }
        if global_touched {
            nodes_touched.extend(self.override_nodes());
        }

        let mut current: Vec<RawEntry> = self.entries.values().cloned().collect();
        current.extend(tombstones.iter().cloned());

        let mut events = Vec::new();
        if global_touched {
            self.recompute(&current, &Layer::Global, &mut events);
        }
        let live = self.override_nodes();
        for node in nodes_touched {
            if live.contains(&node) {
                self.recompute(&current, &Layer::Node(node), &mut events);
                continue;
            }
            // Last override for the node is gone; its view no longer exists.
            let revision =
                tombstones.iter().filter(|t| t.key.node() == Some(node.as_str())).map(|t| t.revision).max().unwrap_or(0);
            let key = self.processor.identity().resource_key(&Layer::Node(node));
            self.remove(key, revision, &mut events);
        }

        self.epoch = self.epoch.saturating_add(1);
        histogram!("sync_apply_ms", started.elapsed().as_secs_f64() * 1000.0);
        debug!(epoch = self.epoch, events = events.len(), entries = self.entries.len(), "applied change batch");
        events
    }

    pub fn freeze(&self) -> Arc<SyncSnapshot<P::Spec>> {
        Arc::new(SyncSnapshot { epoch: self.epoch, resources: self.resources.values().cloned().collect() })
    }

    fn override_nodes(&self) -> BTreeSet<String> {
        self.entries.keys().filter_map(|k| k.node().map(str::to_string)).collect()
    }

    fn recompute(&mut self, current: &[RawEntry], layer: &Layer, events: &mut Vec<ResourceEvent<P::Spec>>) {
        let scope = match layer {
            Layer::Global => None,
            Layer::Node(n) => Some(n.as_str()),
        };
        let out = self.processor.process(current, scope);
        for ev in out.events {
            match ev {
                ResourceEvent::Updated { resource } => {
                    let key = resource.key();
                    if self.resources.get(&key) != Some(&resource) {
                        self.resources.insert(key, resource.clone());
                        events.push(ResourceEvent::Updated { resource });
                    }
                }
                ResourceEvent::Deleted { key, revision } => self.remove(key, revision, events),
            }
        }
    }

    fn remove(&mut self, key: ResourceKey, revision: Revision, events: &mut Vec<ResourceEvent<P::Spec>>) {
        if self.resources.remove(&key).is_some() {
            events.push(ResourceEvent::Deleted { key, revision });
        }
    }
}

/// Handle for readers to access the current snapshot and subscribe to swaps.
pub struct SyncHandle<S> {
    snap: Arc<ArcSwap<SyncSnapshot<S>>>,
    epoch_rx: watch::Receiver<u64>,
}

impl<S> SyncHandle<S> {
    pub fn current(&self) -> Arc<SyncSnapshot<S>> {
        self.snap.load_full()
    }

    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> {
        self.epoch_rx.clone()
    }
}

/// Spawn an ingest loop feeding `processor`. Returns a sender for raw changes, a handle for
/// snapshot reads and the stream of resource events.
pub fn spawn_sync<P>(
    processor: Arc<P>,
    cfg: SyncConfig,
) -> (mpsc::Sender<RawChange>, SyncHandle<P::Spec>, mpsc::Receiver<ResourceEvent<P::Spec>>)
where
    P: UpdateProcessor + 'static,
    P::Spec: Clone + PartialEq + Send + Sync + 'static,
{
    let (tx, mut rx) = mpsc::channel::<RawChange>(cfg.queue_cap);
    let (ev_tx, ev_rx) = mpsc::channel::<ResourceEvent<P::Spec>>(cfg.queue_cap);
    let snap = Arc::new(ArcSwap::from_pointee(SyncSnapshot::default()));
    let (epoch_tx, epoch_rx) = watch::channel(0u64);
    let snap_clone = Arc::clone(&snap);
    let kind = processor.identity().kind;

    tokio::spawn(async move {
        let mut coalescer = Coalescer::with_capacity(cfg.queue_cap);
        let mut builder = ViewBuilder::new(processor);
        let mut ticker = tokio::time::interval(cfg.flush_interval);
        info!(kind, "sync loop started");
        loop {
            let closed = tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(c) => {
                        coalescer.push(c);
                        continue;
                    }
                    None => {
                        debug!("change channel closed; draining and exiting sync loop");
                        true
                    }
                },
                _ = ticker.tick() => false,
            };
            let batch = coalescer.drain_ready();
            if !batch.is_empty() {
                for ev in builder.apply(batch) {
                    let _ = ev_tx.send(ev).await;
                }
                let next = builder.freeze();
                let epoch = next.epoch;
                snap_clone.store(next);
                let _ = epoch_tx.send(epoch);
            }
            if closed {
                break;
            }
        }
        info!(kind, dropped = coalescer.dropped(), "sync loop stopped");
    });

    (tx, SyncHandle { snap, epoch_rx }, ev_rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalescer_keeps_latest_per_key() {
        let mut c = Coalescer::with_capacity(8);
        c.push(RawChange::applied(RawEntry::new(ConfigKey::global("a"), "1", 1)));
        c.push(RawChange::applied(RawEntry::new(ConfigKey::global("b"), "1", 2)));
        c.push(RawChange::deleted(ConfigKey::global("a"), 3));
        assert_eq!(c.len(), 2);
        let out = c.drain_ready();
        assert_eq!(out[0].entry.key, ConfigKey::global("a"));
        assert!(out[0].clone().into_entry().is_deletion());
        assert_eq!(out[1].entry.key, ConfigKey::global("b"));
        assert!(c.is_empty());
    }

    #[test]
    fn coalescer_keeps_newer_revision_over_late_arrival() {
        let mut c = Coalescer::with_capacity(8);
        c.push(RawChange::applied(RawEntry::new(ConfigKey::global("a"), "new", 5)));
        c.push(RawChange::applied(RawEntry::new(ConfigKey::global("a"), "old", 3)));
        c.push(RawChange::deleted(ConfigKey::global("a"), 4));
        let out = c.drain_ready();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].entry.value.as_deref(), Some("new"));
        assert_eq!(out[0].entry.revision, 5);

        c.push(RawChange::applied(RawEntry::new(ConfigKey::global("a"), "x", 7)));
        c.push(RawChange::applied(RawEntry::new(ConfigKey::global("a"), "y", 7)));
        assert_eq!(c.drain_ready()[0].entry.value.as_deref(), Some("y"));
    }

    #[test]
    fn coalescer_drops_oldest_when_full() {
        let mut c = Coalescer::with_capacity(2);
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            c.push(RawChange::applied(RawEntry::new(ConfigKey::global(*name), "v", i as u64)));
        }
        assert_eq!(c.dropped(), 1);
        let keys: Vec<_> = c.drain_ready().into_iter().map(|ch| ch.entry.key).collect();
        assert_eq!(keys, vec![ConfigKey::global("b"), ConfigKey::global("c")]);
    }

    #[test]
    fn sync_config_defaults() {
        let d = SyncConfig::default();
        assert_eq!(d.queue_cap, 1024);
        assert_eq!(d.flush_interval, Duration::from_millis(8));
    }
}
