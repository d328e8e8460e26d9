use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use super::hashing::HashAlgorithm;
use crate::logic::alert::Alert;
use crate::logic::scoring::AnalysisResult;
use crate::logic::session::{Message, Participant, Session};

// ============================================================================
// ENUMS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EvidenceType {
    MessageScreenshot,
    ConversationExport,
    MediaFile,
    SessionRecording,
    SystemLog,
    AiAnalysisReport,
    UserProfileData,
    MetadataExport,
}

impl EvidenceType {
    /// Years an artifact of this type is kept before it may be purged
    pub fn retention_years(&self) -> i64 {
        match self {
            EvidenceType::MessageScreenshot
            | EvidenceType::ConversationExport
            | EvidenceType::MediaFile
            | EvidenceType::UserProfileData => 7,
            EvidenceType::SessionRecording | EvidenceType::AiAnalysisReport | EvidenceType::MetadataExport => 5,
            EvidenceType::SystemLog => 3,
        }
    }

    pub fn retention_until(&self, collected_at: DateTime<Utc>) -> DateTime<Utc> {
        collected_at + Duration::days(self.retention_years() * 365)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CollectionMethod {
    Automated,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CustodyAction {
    Collected,
    Accessed,
    Exported,
    Verified,
    VerificationFailed,
    LegalHoldApplied,
    LegalHoldReleased,
}

// ============================================================================
// CUSTODY
// ============================================================================

/// One link of the append-only custody chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustodyEntry {
    pub sequence: u32,
    pub actor: String,
    pub action: CustodyAction,
    pub at: DateTime<Utc>,
    pub note: Option<String>,
    /// `entry_hash` of the previous link; the content hash for the first
    pub previous_hash: String,
    pub entry_hash: String,
}

// ============================================================================
// EVIDENCE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: Uuid,
    /// Back reference; evidence outlives its alert
    pub alert_id: Uuid,
    pub session_id: Uuid,
    pub evidence_type: EvidenceType,
    pub collection_method: CollectionMethod,
    pub collected_by: String,
    pub collected_at: DateTime<Utc>,
    pub hash_algorithm: HashAlgorithm,
    pub content_hash: String,
    /// Key of the material in the blob store
    pub material_ref: String,
    pub size_bytes: i64,
    pub custody: Vec<CustodyEntry>,
    pub integrity_verified: bool,
    pub integrity_checked_at: Option<DateTime<Utc>>,
    pub legal_hold: bool,
    pub legal_hold_reason: Option<String>,
    pub retention_until: DateTime<Utc>,
}

impl Evidence {
    /// Purgeable: past retention and not held
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.legal_hold && now > self.retention_until
    }
}

// ============================================================================
// MATERIAL
// ============================================================================

/// What an automated capture seals: the alert and everything it points at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "version")]
pub enum EvidencePackage {
    #[serde(rename = "1")]
    V1 {
        reason: String,
        captured_at: DateTime<Utc>,
        alert: Alert,
        session: Session,
        trigger_message: Option<Message>,
        analyses: Vec<AnalysisResult>,
        participants: Vec<Participant>,
    },
}

/// Read-only handoff bundle for an external reviewing party
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceBundle {
    pub alert_id: Uuid,
    pub exported_at: DateTime<Utc>,
    pub exported_by: String,
    pub items: Vec<BundleItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleItem {
    pub evidence_id: Uuid,
    pub evidence_type: EvidenceType,
    pub algorithm: HashAlgorithm,
    pub content_hash: String,
    pub collected_at: DateTime<Utc>,
    pub integrity_verified: bool,
    pub legal_hold: bool,
    /// Full chain, including the export entry for this bundle
    pub custody: Vec<CustodyEntry>,
    pub material_encoding: MaterialEncoding,
    /// The sealed bytes, encoded; decoding and hashing them reproduces `content_hash`
    pub material: String,
}

impl BundleItem {
    /// The exact bytes that were exported
    pub fn material_bytes(&self) -> Result<Vec<u8>, hex::FromHexError> {
        self.material_encoding.decode(&self.material)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MaterialEncoding {
    Hex,
}

impl MaterialEncoding {
    pub fn encode(&self, bytes: &[u8]) -> String {
        match self {
            MaterialEncoding::Hex => hex::encode(bytes),
        }
    }

    pub fn decode(&self, text: &str) -> Result<Vec<u8>, hex::FromHexError> {
        match self {
            MaterialEncoding::Hex => hex::decode(text),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PurgeReport {
    pub purged: usize,
    pub failed: usize,
}
