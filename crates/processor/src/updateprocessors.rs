//! Processors for the config-backed resource kinds.

use cfgsync_apis::{ClusterInformationSpec, FelixConfigurationSpec, KIND_CLUSTER_INFORMATION, KIND_FELIX_CONFIGURATION};
use cfgsync_core::ConfigKey;
use cfgsync_schema::BindError;

use crate::annotations::AnnotationPolicy;
use crate::config::{ConfigUpdateProcessor, ResourceIdentity};

/// Per-node setting key: `/cfgsync/v1/host/<node>/config/<name>`.
pub fn host_config_key(node: &str, name: &str) -> ConfigKey {
    ConfigKey::per_node(node, name)
}

/// Cluster-wide setting key: `/cfgsync/v1/config/<name>`.
pub fn global_config_key(name: &str) -> ConfigKey {
    ConfigKey::global(name)
}

/// ClusterInformation processor. Store annotations never reach the resource.
pub fn new_cluster_info_update_processor() -> Result<ConfigUpdateProcessor<ClusterInformationSpec>, BindError> {
    ConfigUpdateProcessor::new(
        AnnotationPolicy::Disallow,
        host_config_key,
        global_config_key,
        ResourceIdentity::new(KIND_CLUSTER_INFORMATION),
    )
}

/// FelixConfiguration processor. Store annotations are copied onto the resource.
pub fn new_felix_config_update_processor() -> Result<ConfigUpdateProcessor<FelixConfigurationSpec>, BindError> {
    ConfigUpdateProcessor::new(
        AnnotationPolicy::Allow,
        host_config_key,
        global_config_key,
        ResourceIdentity::new(KIND_FELIX_CONFIGURATION),
    )
}

/// Bind every config-backed spec up front so a bad field table fails at startup.
pub fn register_all() -> Result<(), BindError> {
    cfgsync_schema::register::<ClusterInformationSpec>()?;
    cfgsync_schema::register::<FelixConfigurationSpec>()?;
    Ok(())
}
