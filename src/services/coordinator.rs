use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::models::intent::{ArtifactKind, Destination, UploadIntent};
use crate::models::outcome::{DrainReport, SendOutcome, SubmitOutcome};
use crate::services::artifact_store::{ArtifactStore, StorageError};
use crate::services::connectivity::{ConnectivityMonitor, ConnectivityState};
use crate::services::credentials::CredentialProvider;
use crate::services::journal::{IntentJournal, JournalError};
use crate::services::transport::Transport;

/// A capture handed over by the UI: bytes still at their transient location,
/// plus everything the collector needs to file them.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub transient_path: PathBuf,
    pub kind: ArtifactKind,
    pub destination: Destination,
    pub fields: BTreeMap<String, String>,
}

/// Orchestrates the upload queue: immediate-vs-deferred on capture, replay on
/// reconnect, per-intent retry policy, and cleanup ordering.
///
/// Per intent the implicit state machine is NEW -> UPLOADING -> DONE or
/// PENDING; PENDING intents sit in the journal until a later drain pass.
pub struct UploadCoordinator {
    store: Arc<ArtifactStore>,
    journal: Arc<IntentJournal>,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
    monitor: Arc<ConnectivityMonitor>,
    /// Serializes drain passes. An overlapping `drain` waits here and then
    /// runs its own fresh pass, so no intent is ever in flight twice.
    drain_gate: Mutex<()>,
}

impl UploadCoordinator {
    pub fn new(
        store: Arc<ArtifactStore>,
        journal: Arc<IntentJournal>,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
        monitor: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self {
            store,
            journal,
            transport,
            credentials,
            monitor,
            drain_gate: Mutex::new(()),
        }
    }

    /// Handle a fresh capture.
    ///
    /// Online: one direct send; delivered means nothing touches disk. A
    /// transient failure (or being offline in the first place) stages the
    /// capture durably and reports `Queued`, so a dead link never blocks the
    /// operator. Only a business rejection or local storage failure surfaces
    /// as hard.
    pub async fn submit_now(&self, request: CaptureRequest) -> Result<SubmitOutcome, SubmitError> {
        if let Some(missing) = request
            .destination
            .required_fields()
            .iter()
            .find(|field| !request.fields.contains_key(**field))
        {
            return Ok(SubmitOutcome::Rejected(format!(
                "destination {} requires field {missing}",
                request.destination
            )));
        }

        if self.monitor.state() == ConnectivityState::Online {
            let bytes = tokio::fs::read(&request.transient_path).await.map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    StorageError::SourceMissing(request.transient_path.clone())
                } else {
                    StorageError::Io(e)
                }
            })?;

            match self
                .attempt_send(
                    &bytes,
                    request.kind.content_type(),
                    request.destination,
                    &request.fields,
                )
                .await
            {
                SendOutcome::Delivered => {
                    metrics::counter!("uplink_uploads_delivered_total").increment(1);
                    tracing::info!(destination = %request.destination, "capture delivered directly");
                    return Ok(SubmitOutcome::Uploaded);
                }
                SendOutcome::Rejected(reason) => {
                    metrics::counter!("uplink_uploads_rejected_total").increment(1);
                    tracing::warn!(destination = %request.destination, reason = %reason, "capture rejected by collector, not queued");
                    return Ok(SubmitOutcome::Rejected(reason));
                }
                // the monitor said online but the wire disagreed; fall back
                // to the deferred path like any other transient failure
                SendOutcome::Transient(reason) => {
                    return self.stage(request, Some(reason)).await;
                }
                SendOutcome::Unauthorized => {
                    return self
                        .stage(request, Some("credential rejected".to_string()))
                        .await;
                }
            }
        }

        self.stage(request, None).await
    }

    /// Deferred path: artifact first, intent second. A crash in between
    /// leaves an orphan artifact (harmless garbage), never an intent whose
    /// artifact is missing.
    async fn stage(
        &self,
        request: CaptureRequest,
        direct_failure: Option<String>,
    ) -> Result<SubmitOutcome, SubmitError> {
        let name = ArtifactStore::generate_name(request.kind);
        self.store.persist(&request.transient_path, &name).await?;

        let mut intent = UploadIntent::new(name, request.kind, request.destination, request.fields);
        if let Some(reason) = direct_failure {
            intent.attempts = 1;
            intent.last_failure = Some(reason);
        }

        tracing::info!(
            intent_id = %intent.id,
            artifact = %intent.artifact_name,
            destination = %intent.destination,
            "capture staged for later upload"
        );
        self.journal.record(intent).await?;
        metrics::counter!("uplink_uploads_queued_total").increment(1);
        Ok(SubmitOutcome::Queued)
    }

    /// Replay every pending intent against the collector.
    ///
    /// Runs on each reconnect and on demand. Overlapping calls are serialized
    /// (wait, then fresh pass). The pass works on the journal snapshot taken
    /// at entry; intents recorded mid-pass wait for the next trigger, so a
    /// steady stream of captures cannot extend a pass forever.
    pub async fn drain(&self) -> Result<DrainReport, JournalError> {
        let _pass = self.drain_gate.lock().await;
        let snapshot = self.journal.list().await;
        let mut report = DrainReport::default();

        for intent in snapshot {
            let bytes = match self.store.load(&intent.artifact_name).await {
                Ok(bytes) => bytes,
                Err(StorageError::NotFound(_)) => {
                    // unreachable while write-ahead ordering holds, but a
                    // dangling entry must not wedge the queue forever
                    tracing::error!(
                        intent_id = %intent.id,
                        artifact = %intent.artifact_name,
                        "journal entry references a missing artifact, dropping"
                    );
                    self.journal.remove(intent.id).await?;
                    report.rejected += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(intent_id = %intent.id, error = %e, "artifact unreadable, leaving intent for next pass");
                    report.retained += 1;
                    continue;
                }
            };

            let outcome = self
                .attempt_send(
                    &bytes,
                    intent.kind.content_type(),
                    intent.destination,
                    &intent.fields,
                )
                .await;

            // arms that finish the intent `continue`; what falls through is
            // the retryable reason for keeping it
            let reason = match outcome {
                SendOutcome::Delivered => {
                    // journal first, artifact second: a crash in between
                    // leaves an orphan artifact, never an intent whose
                    // artifact already vanished
                    self.journal.remove(intent.id).await?;
                    if let Err(e) = self.store.delete(&intent.artifact_name).await {
                        tracing::warn!(artifact = %intent.artifact_name, error = %e, "artifact cleanup failed, leaving orphan");
                    }
                    metrics::counter!("uplink_uploads_delivered_total").increment(1);
                    tracing::info!(intent_id = %intent.id, attempts = intent.attempts + 1, "pending upload delivered");
                    report.delivered += 1;
                    continue;
                }
                SendOutcome::Rejected(reason) => {
                    // permanent rejection: surfaced once with full context,
                    // then purged, never retried
                    tracing::warn!(
                        intent_id = %intent.id,
                        artifact = %intent.artifact_name,
                        destination = %intent.destination,
                        fields = ?intent.fields,
                        reason = %reason,
                        "collector permanently rejected artifact, purging"
                    );
                    self.journal.remove(intent.id).await?;
                    if let Err(e) = self.store.delete(&intent.artifact_name).await {
                        tracing::warn!(artifact = %intent.artifact_name, error = %e, "artifact cleanup failed, leaving orphan");
                    }
                    metrics::counter!("uplink_uploads_rejected_total").increment(1);
                    report.rejected += 1;
                    continue;
                }
                SendOutcome::Transient(reason) => reason,
                // attempt_send exhausts the refresh-once cycle, so a 401
                // surfacing here is just another transient failure
                SendOutcome::Unauthorized => "credential rejected".to_string(),
            };

            tracing::debug!(intent_id = %intent.id, reason = %reason, "upload attempt failed, retaining intent");
            self.journal
                .update(intent.id, |pending| {
                    pending.attempts += 1;
                    pending.last_failure = Some(reason);
                })
                .await?;
            report.retained += 1;
        }

        metrics::gauge!("uplink_journal_depth").set(self.journal.len().await as f64);
        tracing::info!(
            delivered = report.delivered,
            retained = report.retained,
            rejected = report.rejected,
            "drain pass complete"
        );
        Ok(report)
    }

    /// Long-running task: drain on every `offline -> online` transition.
    /// Ends when the connectivity monitor is dropped.
    pub async fn drain_on_reconnect(self: Arc<Self>) {
        let mut online = self.monitor.watch_online();
        while online.next_online().await {
            tracing::info!("connectivity regained, draining pending uploads");
            if let Err(e) = self.drain().await {
                tracing::error!(error = %e, "drain pass failed");
            }
        }
    }

    /// One send with credential handling: fetch, send, and on a 401 refresh
    /// once and resend. A second 401 gives up on the attempt (the intent
    /// stays queued); an unavailable credential counts as transient.
    async fn attempt_send(
        &self,
        bytes: &[u8],
        content_type: &str,
        destination: Destination,
        fields: &BTreeMap<String, String>,
    ) -> SendOutcome {
        let credential = match self.credentials.credential().await {
            Ok(credential) => credential,
            Err(e) => return SendOutcome::Transient(e.to_string()),
        };

        match self
            .transport
            .send(bytes, content_type, destination, fields, &credential)
            .await
        {
            SendOutcome::Unauthorized => {
                tracing::info!("collector rejected credential, refreshing and retrying once");
                let refreshed = match self.credentials.refresh().await {
                    Ok(credential) => credential,
                    Err(e) => return SendOutcome::Transient(e.to_string()),
                };
                match self
                    .transport
                    .send(bytes, content_type, destination, fields, &refreshed)
                    .await
                {
                    SendOutcome::Unauthorized => {
                        SendOutcome::Transient("credential rejected twice".to_string())
                    }
                    outcome => outcome,
                }
            }
            outcome => outcome,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Journal(#[from] JournalError),
}
