//! ClusterInformation: cluster-wide identity and datastore readiness.

use cfgsync_core::Resource;
use cfgsync_schema::{ConfigSpec, FieldDecl};
use serde::{Deserialize, Serialize};

use crate::GROUP_VERSION_CURRENT;

pub const KIND_CLUSTER_INFORMATION: &str = "ClusterInformation";

pub type ClusterInformation = Resource<ClusterInformationSpec>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInformationSpec {
    /// Unique identifier generated when the cluster is first initialised.
    #[serde(rename = "clusterGUID", default, skip_serializing_if = "Option::is_none")]
    pub cluster_guid: Option<String>,
    /// Comma separated list of cluster type tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_type: Option<String>,
    /// Version of the software that last initialised the datastore.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datastore_version: Option<String>,
    /// Whether agents may consume data from the datastore.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datastore_ready: Option<bool>,
}

impl ConfigSpec for ClusterInformationSpec {
    const KIND: &'static str = KIND_CLUSTER_INFORMATION;

    fn fields() -> Vec<FieldDecl<Self>> {
        vec![
            FieldDecl::text("ClusterGUID", "clusterGUID", |s| s.cluster_guid.as_deref(), |s, v| s.cluster_guid = Some(v)),
            FieldDecl::text("ClusterType", "clusterType", |s| s.cluster_type.as_deref(), |s, v| s.cluster_type = Some(v)),
            FieldDecl::text(
                "DatastoreVersion",
                "datastoreVersion",
                |s| s.datastore_version.as_deref(),
                |s, v| s.datastore_version = Some(v),
            ),
            FieldDecl::boolean("DatastoreReady", "datastoreReady", |s| s.datastore_ready, |s, v| s.datastore_ready = Some(v)),
        ]
    }
}

/// Zero-valued ClusterInformation stamped with the current API version.
pub fn new_cluster_information() -> ClusterInformation {
    Resource::new(KIND_CLUSTER_INFORMATION, GROUP_VERSION_CURRENT)
}
