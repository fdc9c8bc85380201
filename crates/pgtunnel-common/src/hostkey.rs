//! Host key pinning
//!
//! The provisioning service hands out the bastion's public host key as an
//! OpenSSH-style entry (`ssh-ed25519 AAAAC3Nz...`). SSH libraries surface the
//! key offered during the handshake either as that base64 text or as the raw
//! wire blob, so both forms are checked against the single pinned entry.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::TunnelError;

/// A host key as presented by an SSH library during key exchange
#[derive(Debug, Clone, Copy)]
pub enum OfferedHostKey<'a> {
    /// Base64 text of the public key blob
    Encoded(&'a str),
    /// Raw public key blob in SSH wire format
    Raw(&'a [u8]),
}

/// The expected host key, parsed from the provisioning response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedHostKey {
    algorithm: String,
    encoded: String,
    blob: Vec<u8>,
}

impl PinnedHostKey {
    /// Parse `<algorithm> <base64>` (a trailing comment is ignored) or a bare `<base64>`
    pub fn parse(entry: &str) -> Result<Self, TunnelError> {
        let mut fields = entry.split_whitespace();
        let first = fields
            .next()
            .ok_or_else(|| TunnelError::InvalidHostKey("empty host key entry".to_string()))?;

        let (declared, encoded) = match fields.next() {
            Some(second) => (Some(first), second),
            None => (None, first),
        };

        let blob = STANDARD
            .decode(encoded)
            .map_err(|e| TunnelError::InvalidHostKey(format!("not valid base64: {}", e)))?;

        let algorithm = blob_algorithm(&blob).ok_or_else(|| {
            TunnelError::InvalidHostKey("key blob has no algorithm name".to_string())
        })?;

        if let Some(declared) = declared {
            if declared != algorithm {
                return Err(TunnelError::InvalidHostKey(format!(
                    "entry declares {} but key blob is {}",
                    declared, algorithm
                )));
            }
        }

        Ok(Self {
            algorithm,
            encoded: encoded.to_string(),
            blob,
        })
    }

    /// Host key algorithm name (e.g. `ssh-ed25519`)
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Base64 text of the pinned key
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Accept only an exact match. Never partial, never trust-on-first-use.
    pub fn verify(&self, offered: OfferedHostKey<'_>) -> bool {
        let matches = match offered {
            OfferedHostKey::Encoded(text) => !text.is_empty() && text == self.encoded,
            OfferedHostKey::Raw(bytes) => !bytes.is_empty() && bytes == self.blob.as_slice(),
        };
        if !matches {
            tracing::debug!("Offered {} host key does not match the pin", self.algorithm);
        }
        matches
    }
}

/// Leading SSH `string` of a public key blob: u32 big-endian length + name
fn blob_algorithm(blob: &[u8]) -> Option<String> {
    let len_bytes: [u8; 4] = blob.get(..4)?.try_into().ok()?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    let name = blob.get(4..4usize.checked_add(len)?)?;
    if name.is_empty() {
        return None;
    }
    String::from_utf8(name.to_vec()).ok()
}
