//! Course completion certificates.
//!
//! Certificates are JSON documents pinned to IPFS. The locally computed CID
//! is a CIDv1 (raw codec, sha2-256) over the RFC 8785 canonical encoding, so
//! the same certificate always maps to the same identifier.

use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};
use serde::{Deserialize, Serialize};

use crate::constants::IPFS_GATEWAY_BASE;
use crate::error::CoreError;

/// Multicodec code for raw bytes.
const RAW_CODEC: u64 = 0x55;

/// Module entry listed on a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateModule {
    /// Module id.
    pub id: u32,
    /// Module title.
    pub title: String,
    /// Number of lessons.
    #[serde(default)]
    pub lessons: u32,
    /// Display duration (e.g. "2h").
    #[serde(default)]
    pub duration: String,
}

/// Certificate content, before pinning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateMetadata {
    /// Learner wallet, lowercase.
    pub student_address: String,
    /// Course id.
    pub course_id: String,
    /// Course title.
    pub course_name: String,
    /// `YYYY-MM-DD` of completion.
    pub completion_date: String,
    /// Completed modules.
    pub modules: Vec<CertificateModule>,
    /// Stake that was escrowed (ETH).
    pub stake_amount: String,
    /// RFC 3339 completion time.
    pub completed_at: String,
}

/// Certificate after pinning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinnedCertificate {
    /// Certificate content.
    #[serde(flatten)]
    pub metadata: CertificateMetadata,
    /// Content identifier.
    pub cid: String,
    /// Gateway URL of the pinned document.
    pub gateway_url: String,
    /// RFC 3339 pin time.
    pub uploaded_at: String,
}

/// Canonical JSON bytes of any serializable value.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>, CoreError> {
    serde_jcs::to_vec(value).map_err(|e| CoreError::Serialization(e.to_string()))
}

/// CIDv1 of raw content.
pub fn content_cid(bytes: &[u8]) -> Cid {
    Cid::new_v1(RAW_CODEC, Code::Sha2_256.digest(bytes))
}

/// CID of a JSON value's canonical encoding.
pub fn json_cid<T: Serialize>(value: &T) -> Result<Cid, CoreError> {
    Ok(content_cid(&canonical_json(value)?))
}

/// Gateway URL for a CID.
pub fn gateway_url(cid: &str) -> String {
    format!("{}{}", IPFS_GATEWAY_BASE, cid)
}
