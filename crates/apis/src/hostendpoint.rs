//! HostEndpoint: a bare-metal interface attached to a host running the agent.
//!
//! Pure schema. The list fields mean it is never fed through a config update processor.

use std::fmt;

use cfgsync_core::{Resource, TypeMeta};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ListMeta;
use serde::{Deserialize, Serialize};

use crate::GROUP_VERSION_CURRENT;

pub const KIND_HOST_ENDPOINT: &str = "HostEndpoint";
pub const KIND_HOST_ENDPOINT_LIST: &str = "HostEndpointList";

pub type HostEndpoint = Resource<HostEndpointSpec>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostEndpointSpec {
    /// Node name of the agent instance that owns the interface.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node: String,
    /// Linux interface to apply policy to, e.g. `eth0`. When empty at least one expected IP
    /// must be given.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interface_name: String,
    /// Expected IPv4/IPv6 addresses of the endpoint.
    #[serde(rename = "expectedIPs", default, skip_serializing_if = "Vec::is_empty")]
    pub expected_ips: Vec<String>,
    /// Profiles applied to the endpoint, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub profiles: Vec<String>,
    /// Named ports policy rules may reference.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<EndpointPort>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointPort {
    pub name: String,
    pub protocol: Protocol,
    pub port: u16,
}

/// IP protocol given either by number or by name (`TCP`, `UDP`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Protocol {
    Number(u8),
    Name(String),
}

impl Protocol {
    pub fn tcp() -> Self {
        Protocol::Name("TCP".into())
    }

    pub fn udp() -> Self {
        Protocol::Name("UDP".into())
    }
}

impl From<&str> for Protocol {
    fn from(s: &str) -> Self {
        match s.parse::<u8>() {
            Ok(n) => Protocol::Number(n),
            Err(_) => Protocol::Name(s.to_string()),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Number(n) => write!(f, "{}", n),
            Protocol::Name(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostEndpointList {
    #[serde(flatten)]
    pub type_meta: TypeMeta,
    #[serde(default)]
    pub metadata: ListMeta,
    pub items: Vec<HostEndpoint>,
}

/// Zero-valued HostEndpoint stamped with the current API version.
pub fn new_host_endpoint() -> HostEndpoint {
    Resource::new(KIND_HOST_ENDPOINT, GROUP_VERSION_CURRENT)
}

/// Empty HostEndpointList stamped with the current API version.
pub fn new_host_endpoint_list() -> HostEndpointList {
    HostEndpointList {
        type_meta: TypeMeta::new(KIND_HOST_ENDPOINT_LIST, GROUP_VERSION_CURRENT),
        ..Default::default()
    }
}
