//! NIP-98 HTTP authentication headers.
//!
//! Each administrative request carries a freshly signed kind `27235` event that
//! binds the caller's key to the exact URL, method, and body of that request.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha2::{Digest, Sha256};

use crate::{
    error::{Error, Result},
    event::{Tag, UnsignedEvent, KIND_HTTP_AUTH},
    signer::Signer,
};

/// Scheme label prefixed to the encoded attestation.
pub const SCHEME: &str = "Nostr";

/// Hex-encoded SHA-256 of a request body.
pub fn payload_hash(body: &str) -> String {
    hex::encode(Sha256::digest(body.as_bytes()))
}

/// Build the unsigned attestation for one request.
pub fn attestation(url: &str, method: &str, body: Option<&str>, created_at: u64) -> UnsignedEvent {
    let mut tags = vec![Tag::pair("u", url), Tag::pair("method", method)];
    if let Some(body) = body {
        tags.push(Tag::pair("payload", payload_hash(body)));
    }
    UnsignedEvent {
        kind: KIND_HTTP_AUTH,
        created_at,
        tags,
        content: String::new(),
    }
}

/// Sign an attestation for `url`/`method`/`body` and return the complete
/// `Authorization` header value (`Nostr <base64 event json>`).
///
/// Fails with [`Error::SignerNotFound`] when no signer is supplied.
pub async fn auth_header(
    signer: Option<&dyn Signer>,
    url: &str,
    method: &str,
    body: Option<&str>,
) -> Result<String> {
    let signer = signer.ok_or(Error::SignerNotFound)?;
    let unsigned = attestation(url, method, body, unix_now());
    let signed = signer.sign_event(unsigned).await?;
    let json = serde_json::to_string(&signed)?;
    Ok(format!("{SCHEME} {}", BASE64.encode(json)))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
