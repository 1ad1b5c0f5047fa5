//! Shared fakes and fixtures for the offline queue tests.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use capture_uplink::models::intent::{ArtifactKind, Destination};
use capture_uplink::models::outcome::SendOutcome;
use capture_uplink::services::artifact_store::ArtifactStore;
use capture_uplink::services::connectivity::{ConnectivityMonitor, ConnectivityState};
use capture_uplink::services::coordinator::{CaptureRequest, UploadCoordinator};
use capture_uplink::services::credentials::{Credential, CredentialError, CredentialProvider};
use capture_uplink::services::journal::IntentJournal;
use capture_uplink::services::transport::Transport;
use tokio::sync::Mutex;

/// Everything one transport call saw, for assertions.
#[derive(Debug, Clone)]
pub struct RecordedSend {
    pub destination: Destination,
    pub fields: BTreeMap<String, String>,
    pub bytes: Vec<u8>,
    pub token: String,
}

/// Transport double: plays back a script of outcomes, then a fallback, and
/// records every call it saw.
pub struct FakeTransport {
    script: Mutex<VecDeque<SendOutcome>>,
    fallback: SendOutcome,
    delay: Option<Duration>,
    sends: Mutex<Vec<RecordedSend>>,
}

impl FakeTransport {
    pub fn always(fallback: SendOutcome) -> Arc<Self> {
        Self::scripted(Vec::new(), fallback)
    }

    pub fn scripted(script: Vec<SendOutcome>, fallback: SendOutcome) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            delay: None,
            sends: Mutex::new(Vec::new()),
        })
    }

    /// Like `always`, but each send takes `delay`, long enough for a test
    /// to overlap other work with an in-flight pass.
    pub fn slow(fallback: SendOutcome, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: Some(delay),
            sends: Mutex::new(Vec::new()),
        })
    }

    pub async fn send_count(&self) -> usize {
        self.sends.lock().await.len()
    }

    pub async fn sends(&self) -> Vec<RecordedSend> {
        self.sends.lock().await.clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(
        &self,
        artifact: &[u8],
        _content_type: &str,
        destination: Destination,
        fields: &BTreeMap<String, String>,
        credential: &Credential,
    ) -> SendOutcome {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.sends.lock().await.push(RecordedSend {
            destination,
            fields: fields.clone(),
            bytes: artifact.to_vec(),
            token: credential.token.clone(),
        });
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Credential double: counts refreshes and hands out a distinguishable token
/// after the first refresh.
pub struct FakeCredentials {
    refreshes: AtomicUsize,
    unavailable: AtomicBool,
}

impl FakeCredentials {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            refreshes: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
        })
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    fn token(&self) -> String {
        if self.refreshes.load(Ordering::SeqCst) == 0 {
            "stale-token".to_string()
        } else {
            "fresh-token".to_string()
        }
    }
}

#[async_trait]
impl CredentialProvider for FakeCredentials {
    async fn credential(&self) -> Result<Credential, CredentialError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CredentialError::Unavailable("auth service down".to_string()));
        }
        Ok(Credential { token: self.token() })
    }

    async fn refresh(&self) -> Result<Credential, CredentialError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CredentialError::Unavailable("auth service down".to_string()));
        }
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(Credential { token: self.token() })
    }
}

/// A full queue wired against fakes, on its own temp directory.
pub struct QueueFixture {
    pub dir: tempfile::TempDir,
    pub store: Arc<ArtifactStore>,
    pub journal: Arc<IntentJournal>,
    pub monitor: Arc<ConnectivityMonitor>,
    pub credentials: Arc<FakeCredentials>,
    pub transport: Arc<FakeTransport>,
    pub coordinator: Arc<UploadCoordinator>,
}

impl QueueFixture {
    pub async fn new(initial: ConnectivityState, transport: Arc<FakeTransport>) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        Self::wire(dir, initial, transport).await
    }

    /// Reopen store, journal, and coordinator from the same directories, as
    /// after a process restart. The old in-memory state is discarded.
    pub async fn restart(self, transport: Arc<FakeTransport>) -> Self {
        let dir = self.dir;
        Self::wire(dir, ConnectivityState::Online, transport).await
    }

    async fn wire(
        dir: tempfile::TempDir,
        initial: ConnectivityState,
        transport: Arc<FakeTransport>,
    ) -> Self {
        let store = Arc::new(
            ArtifactStore::open(dir.path().join("artifacts"))
                .await
                .expect("open store"),
        );
        let journal = Arc::new(
            IntentJournal::open(dir.path().join("journal"))
                .await
                .expect("open journal"),
        );
        let monitor = Arc::new(ConnectivityMonitor::new(initial));
        let credentials = FakeCredentials::new();
        let coordinator = Arc::new(UploadCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&journal),
            transport.clone(),
            credentials.clone(),
            Arc::clone(&monitor),
        ));
        Self {
            dir,
            store,
            journal,
            monitor,
            credentials,
            transport,
            coordinator,
        }
    }

    /// Write a transient capture file, as the camera/signature pad would.
    pub async fn capture(&self, file_name: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir.path().join(file_name);
        tokio::fs::write(&path, contents).await.expect("write capture");
        path
    }

    /// An inbound photo request carrying the company code the destination
    /// mandates.
    pub fn inbound_photo(&self, transient_path: PathBuf) -> CaptureRequest {
        let mut fields = BTreeMap::new();
        fields.insert("company_code".to_string(), "OUT".to_string());
        CaptureRequest {
            transient_path,
            kind: ArtifactKind::Image,
            destination: Destination::InboundPhoto,
            fields,
        }
    }
}
