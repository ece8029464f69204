//! The capability the watch/syncer layer drives.

use cfgsync_core::{ConfigKey, RawEntry, Resource};
use cfgsync_schema::ConfigSpec;

use crate::config::{ConfigUpdateProcessor, DecomposeError, ProcessOutcome, ResourceIdentity};

/// Turns batches of raw store entries into typed resource events, and typed resources back
/// into raw entries.
pub trait UpdateProcessor: Send + Sync {
    type Spec;

    fn identity(&self) -> &ResourceIdentity;

    /// Whether entries for `key` are consumed by this processor.
    fn handles(&self, key: &ConfigKey) -> bool;

    fn process(&self, entries: &[RawEntry], scope_node: Option<&str>) -> ProcessOutcome<Self::Spec>;

    fn decompose(&self, resource: &Resource<Self::Spec>) -> Result<Vec<RawEntry>, DecomposeError>;
}

impl<S: ConfigSpec> UpdateProcessor for ConfigUpdateProcessor<S> {
    type Spec = S;

    fn identity(&self) -> &ResourceIdentity {
        ConfigUpdateProcessor::identity(self)
    }

    fn handles(&self, key: &ConfigKey) -> bool {
        ConfigUpdateProcessor::handles(self, key)
    }

    fn process(&self, entries: &[RawEntry], scope_node: Option<&str>) -> ProcessOutcome<S> {
        self.process_updates(entries, scope_node)
    }

    fn decompose(&self, resource: &Resource<S>) -> Result<Vec<RawEntry>, DecomposeError> {
        ConfigUpdateProcessor::decompose(self, resource)
    }
}
