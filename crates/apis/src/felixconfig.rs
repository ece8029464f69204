//! FelixConfiguration: dataplane agent settings, cluster-wide with per-node overrides.

use cfgsync_core::Resource;
use cfgsync_schema::{ConfigSpec, FieldDecl};
use serde::{Deserialize, Serialize};

use crate::GROUP_VERSION_CURRENT;

pub const KIND_FELIX_CONFIGURATION: &str = "FelixConfiguration";

pub type FelixConfiguration = Resource<FelixConfigurationSpec>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FelixConfigurationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_severity_screen: Option<String>,
    /// Seconds between status reports; 0 disables reporting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporting_interval_secs: Option<u32>,
    #[serde(rename = "ipipEnabled", default, skip_serializing_if = "Option::is_none")]
    pub ipip_enabled: Option<bool>,
    #[serde(rename = "ipipMTU", default, skip_serializing_if = "Option::is_none")]
    pub ipip_mtu: Option<u32>,
    /// Seconds between full iptables refreshes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iptables_refresh_interval: Option<u32>,
}

impl ConfigSpec for FelixConfigurationSpec {
    const KIND: &'static str = KIND_FELIX_CONFIGURATION;

    fn fields() -> Vec<FieldDecl<Self>> {
        vec![
            FieldDecl::text(
                "LogSeverityScreen",
                "logSeverityScreen",
                |s| s.log_severity_screen.as_deref(),
                |s, v| s.log_severity_screen = Some(v),
            ),
            FieldDecl::integer(
                "ReportingIntervalSecs",
                "reportingIntervalSecs",
                0,
                i64::from(u32::MAX),
                |s| s.reporting_interval_secs.map(i64::from),
                |s, v| s.reporting_interval_secs = u32::try_from(v).ok(),
            ),
            FieldDecl::boolean("IpInIpEnabled", "ipipEnabled", |s| s.ipip_enabled, |s, v| s.ipip_enabled = Some(v)),
            FieldDecl::integer(
                "IpInIpMtu",
                "ipipMTU",
                1,
                65535,
                |s| s.ipip_mtu.map(i64::from),
                |s, v| s.ipip_mtu = u32::try_from(v).ok(),
            ),
            FieldDecl::integer(
                "IptablesRefreshInterval",
                "iptablesRefreshInterval",
                0,
                i64::from(u32::MAX),
                |s| s.iptables_refresh_interval.map(i64::from),
                |s, v| s.iptables_refresh_interval = u32::try_from(v).ok(),
            ),
        ]
    }
}

pub fn new_felix_configuration() -> FelixConfiguration {
    Resource::new(KIND_FELIX_CONFIGURATION, GROUP_VERSION_CURRENT)
}
