use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use capture_uplink::{
    config::UplinkConfig,
    services::{
        artifact_store::ArtifactStore,
        connectivity::{ConnectivityMonitor, ConnectivityState},
        coordinator::UploadCoordinator,
        credentials::StaticTokenProvider,
        journal::IntentJournal,
        transport::HttpTransport,
    },
};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

const PROBE_TIMEOUT_SECS: u64 = 5;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting capture uplink worker");

    // Load configuration
    let config = UplinkConfig::from_env().expect("Failed to load configuration");

    // Prometheus metrics with the exporter's built-in listener
    let metrics_addr: SocketAddr = config
        .metrics_bind_addr
        .parse()
        .expect("Invalid metrics bind address");
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .expect("Failed to install Prometheus metrics recorder");

    metrics::describe_counter!(
        "uplink_uploads_delivered_total",
        "Captures confirmed received by the collector"
    );
    metrics::describe_counter!(
        "uplink_uploads_queued_total",
        "Captures staged durably for a later drain"
    );
    metrics::describe_counter!(
        "uplink_uploads_rejected_total",
        "Captures permanently rejected by the collector"
    );
    metrics::describe_gauge!(
        "uplink_journal_depth",
        "Pending upload intents in the journal"
    );

    // Durable state under the data directory
    let data_dir = Path::new(&config.data_dir);
    tracing::info!(data_dir = %data_dir.display(), "Opening artifact store and intent journal");
    let store = Arc::new(
        ArtifactStore::open(data_dir.join("artifacts"))
            .await
            .expect("Failed to open artifact store"),
    );
    let journal = Arc::new(
        IntentJournal::open(data_dir.join("journal"))
            .await
            .expect("Failed to open intent journal"),
    );
    tracing::info!(pending = journal.len().await, "Journal loaded");

    // Collector transport and credentials
    let transport = Arc::new(
        HttpTransport::new(
            config.collector_base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
        .expect("Failed to build collector transport"),
    );
    let credentials = Arc::new(StaticTokenProvider::new(config.api_token.clone()));

    // Start offline: the first successful probe then counts as a reconnect
    // and replays anything left over from a previous run
    let monitor = Arc::new(ConnectivityMonitor::new(ConnectivityState::Offline));

    let coordinator = Arc::new(UploadCoordinator::new(
        store,
        journal,
        transport,
        credentials,
        Arc::clone(&monitor),
    ));

    tokio::spawn(Arc::clone(&coordinator).drain_on_reconnect());

    tracing::info!(
        collector = %config.collector_base_url,
        probe_interval_secs = config.probe_interval_secs,
        "Worker ready, probing collector reachability"
    );

    let probe = reqwest::Client::builder()
        .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
        .build()
        .expect("Failed to build probe client");
    let health_url = format!("{}/health", config.collector_base_url);

    loop {
        let observed = match probe.get(&health_url).send().await {
            Ok(resp) if resp.status().is_success() => ConnectivityState::Online,
            Ok(resp) => {
                tracing::debug!(status = %resp.status(), "Health probe returned non-success");
                ConnectivityState::Offline
            }
            Err(e) => {
                tracing::debug!(error = %e, "Health probe failed");
                ConnectivityState::Offline
            }
        };
        monitor.report(observed);
        sleep(Duration::from_secs(config.probe_interval_secs)).await;
    }
}
