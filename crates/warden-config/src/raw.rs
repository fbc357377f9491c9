use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    pub state_dir: Option<String>,
    pub log_dir: Option<String>,
    #[serde(default)]
    pub defaults: RawDefaults,
    pub services: BTreeMap<String, RawService>,
    #[serde(default)]
    pub profiles: BTreeMap<String, RawProfile>,
}

fn default_version() -> u32 {
    1
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawDefaults {
    pub startup_timeout_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub graceful_stop_ms: Option<u64>,
    pub forced_stop_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawService {
    pub cmd: Vec<String>,
    pub cwd: Option<String>,
    pub log: Option<String>,
    pub env: Option<BTreeMap<String, String>>,
    pub deps: Option<Vec<String>>,
    pub healthcheck: Option<RawHealthCheck>,
    pub startup_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawHealthCheck {
    pub protocol: Option<String>,
    pub host: Option<String>,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawProfile {
    pub services: Vec<String>,
}
