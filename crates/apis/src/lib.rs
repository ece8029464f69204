//! cfgsync resource types: spec payloads, kinds and zero-valued constructors.

#![forbid(unsafe_code)]

pub mod clusterinfo;
pub mod felixconfig;
pub mod hostendpoint;

pub use clusterinfo::{new_cluster_information, ClusterInformation, ClusterInformationSpec, KIND_CLUSTER_INFORMATION};
pub use felixconfig::{new_felix_configuration, FelixConfiguration, FelixConfigurationSpec, KIND_FELIX_CONFIGURATION};
pub use hostendpoint::{
    new_host_endpoint, new_host_endpoint_list, EndpointPort, HostEndpoint, HostEndpointList, HostEndpointSpec, Protocol,
    KIND_HOST_ENDPOINT, KIND_HOST_ENDPOINT_LIST,
};

/// API group/version stamped on every resource this crate constructs.
pub const GROUP_VERSION_CURRENT: &str = "config.cfgsync.dev/v2";

/// Name of the single cluster-wide instance of a config resource.
pub const GLOBAL_RESOURCE_NAME: &str = "default";

/// Prefix of per-node config resource names (`node.<nodename>`).
pub const NODE_RESOURCE_PREFIX: &str = "node.";
