//! cfgsync config update processor.
//!
//! Translates flat store settings (global, or overridden per node) into typed config
//! resources and back:
//!
//! - [`ConfigUpdateProcessor::process_updates`] composes the view of one scope from a
//!   batch of raw entries; per-node values override global ones.
//! - [`ConfigUpdateProcessor::decompose`] splits a resource into raw entries for its scope.
//! - [`AnnotationPolicy`] decides whether entry annotations reach resource metadata.

#![forbid(unsafe_code)]

pub mod annotations;
pub mod config;
pub mod scope;
pub mod syncer;
pub mod updateprocessors;

pub use annotations::AnnotationPolicy;
pub use config::{
    ConfigUpdateProcessor, ConversionDiagnostic, DecomposeError, GlobalKeyFn, NodeKeyFn, ProcessOutcome, ResourceIdentity,
};
pub use scope::{Layer, ScopeStack};
pub use syncer::UpdateProcessor;
pub use updateprocessors::{
    global_config_key, host_config_key, new_cluster_info_update_processor, new_felix_config_update_processor, register_all,
};
