use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// What kind of media an artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ArtifactKind {
    Image,
    Signature,
}

impl ArtifactKind {
    /// MIME type sent to the collector.
    pub fn content_type(&self) -> &'static str {
        match self {
            ArtifactKind::Image => "image/jpeg",
            ArtifactKind::Signature => "image/png",
        }
    }

    /// File extension used for stored artifact names.
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Image => "jpg",
            ArtifactKind::Signature => "png",
        }
    }
}

/// Which collector endpoint a capture belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Destination {
    InboundPhoto,
    OrderCheckPhoto,
    Signature,
}

impl Destination {
    /// Path of the collector endpoint, relative to the collector base URL.
    pub fn endpoint_path(&self) -> &'static str {
        match self {
            Destination::InboundPhoto => "/api/v1/media/inbound-photos",
            Destination::OrderCheckPhoto => "/api/v1/media/order-check-photos",
            Destination::Signature => "/api/v1/media/signatures",
        }
    }

    /// Metadata fields the collector mandates for this destination.
    /// A submit missing one of these is rejected up front, never queued.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Destination::InboundPhoto => &["company_code"],
            Destination::OrderCheckPhoto => &["company_code", "order_number"],
            Destination::Signature => &["company_code", "order_number"],
        }
    }
}

/// A pending upload, durably recorded in the [`IntentJournal`] until the
/// collector confirms receipt of the referenced artifact.
///
/// [`IntentJournal`]: crate::services::journal::IntentJournal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadIntent {
    pub id: Uuid,
    /// Name of the artifact in the [`ArtifactStore`]. The artifact is always
    /// persisted before the intent is recorded, so this reference never
    /// dangles.
    ///
    /// [`ArtifactStore`]: crate::services::artifact_store::ArtifactStore
    pub artifact_name: String,
    pub kind: ArtifactKind,
    pub destination: Destination,
    /// Destination-specific metadata (company code, order number, ...).
    pub fields: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    /// Number of failed delivery attempts so far.
    pub attempts: u32,
    pub last_failure: Option<String>,
}

impl UploadIntent {
    pub fn new(
        artifact_name: String,
        kind: ArtifactKind,
        destination: Destination,
        fields: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            artifact_name,
            kind,
            destination,
            fields,
            created_at: Utc::now(),
            attempts: 0,
            last_failure: None,
        }
    }
}
