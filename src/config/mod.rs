use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct UplinkConfig {
    /// Base URL of the remote collector (e.g., "https://collector.example.com")
    pub collector_base_url: String,

    /// Bearer token authorizing uploads (worker binary; host apps wire their
    /// own credential provider)
    pub api_token: String,

    /// Directory holding staged artifacts and the intent journal
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Per-request upload timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Interval between collector health probes in seconds
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,

    /// Bind address for the Prometheus metrics listener
    #[serde(default = "default_metrics_bind_addr")]
    pub metrics_bind_addr: String,
}

fn default_data_dir() -> String {
    "./uplink-data".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_probe_interval_secs() -> u64 {
    15
}

fn default_metrics_bind_addr() -> String {
    "0.0.0.0:9090".to_string()
}

impl UplinkConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
