//! Certificate encryption before pinning.
//!
//! Documents pushed to IPFS are public, so certificates are sealed with
//! ChaCha20-Poly1305 first. The owner's address is bound as associated data:
//! an envelope only opens for the wallet it was issued to.

use alloy::primitives::Address;
use anyhow::{Context, Result};
use chacha20poly1305::{
    aead::{Aead, Payload},
    ChaCha20Poly1305, Key, KeyInit, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key length in bytes.
pub const KEY_LEN: usize = 32;

/// Nonce length for ChaCha20-Poly1305.
pub const NONCE_LEN: usize = 12;

const SCHEME: &str = "chacha20-poly1305";

/// What gets pinned in place of the plaintext certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedDocument {
    /// Cipher identifier.
    pub encryption: String,
    /// Wallet the document was sealed for.
    pub owner: String,
    /// Hex nonce.
    pub nonce: String,
    /// Hex ciphertext with the Poly1305 tag appended.
    pub ciphertext: String,
}

/// Seals and opens certificate documents under one service key.
#[derive(Clone)]
pub struct CertificateSealer {
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for CertificateSealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateSealer").finish_non_exhaustive()
    }
}

impl CertificateSealer {
    /// Sealer over a raw 32-byte key.
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Parse a hex key, with or without `0x`.
    pub fn from_hex(raw: &str) -> Result<Self> {
        let bytes = hex::decode(raw.trim().trim_start_matches("0x"))
            .context("Certificate encryption key is not hex")?;
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            anyhow::anyhow!(
                "Certificate encryption key must be {} bytes, got {}",
                KEY_LEN,
                b.len()
            )
        })?;
        Ok(Self::new(key))
    }

    /// Sealer over a fresh random key. Documents sealed with it cannot be
    /// opened after the process exits.
    pub fn ephemeral() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self::new(key)
    }

    /// `CERTIFICATE_ENCRYPTION_KEY` if set, otherwise `None`.
    pub fn from_env() -> Result<Option<Self>> {
        std::env::var("CERTIFICATE_ENCRYPTION_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| Self::from_hex(&v))
            .transpose()
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.key))
    }

    /// Encrypt `document` for `owner`.
    pub fn seal(&self, owner: &Address, document: &Value) -> Result<SealedDocument> {
        let plaintext = serde_json::to_vec(document)?;
        let owner = format!("{:#x}", owner);

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher()
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &plaintext,
                    aad: owner.as_bytes(),
                },
            )
            .map_err(|e| anyhow::anyhow!("Certificate encryption failed: {}", e))?;

        Ok(SealedDocument {
            encryption: SCHEME.to_string(),
            owner,
            nonce: hex::encode(nonce),
            ciphertext: hex::encode(ciphertext),
        })
    }

    /// Decrypt an envelope sealed for `owner`.
    pub fn open(&self, owner: &Address, sealed: &SealedDocument) -> Result<Value> {
        if sealed.encryption != SCHEME {
            anyhow::bail!("Unsupported certificate encryption: {}", sealed.encryption);
        }
        let nonce: [u8; NONCE_LEN] = hex::decode(&sealed.nonce)
            .context("Invalid nonce hex")?
            .try_into()
            .map_err(|_| anyhow::anyhow!("Nonce must be {} bytes", NONCE_LEN))?;
        let ciphertext = hex::decode(&sealed.ciphertext).context("Invalid ciphertext hex")?;
        let owner = format!("{:#x}", owner);

        let plaintext = self
            .cipher()
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &ciphertext,
                    aad: owner.as_bytes(),
                },
            )
            .map_err(|_| anyhow::anyhow!("Certificate does not open for {}", owner))?;

        serde_json::from_slice(&plaintext).context("Sealed certificate is not JSON")
    }
}
