//! Nostr event model.

use secp256k1::{schnorr::Signature, Message, Secp256k1, XOnlyPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Kind used for NIP-98 HTTP authentication events.
pub const KIND_HTTP_AUTH: u32 = 27235;

/// Wrapper for a Nostr tag expressed as an array of strings.
///
/// Tags appear as small arrays where the first element denotes the type and the
/// following elements hold data. The ones this console produces or reads are:
///
/// - `u` – absolute request URL on an HTTP auth event
/// - `method` – HTTP method on an HTTP auth event
/// - `payload` – hex SHA-256 of the request body
/// - `p` / `e` – referenced pubkey or event, shown in the feed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag(pub Vec<String>);

impl Tag {
    /// Build a two-element `[name, value]` tag.
    pub fn pair(name: &str, value: impl Into<String>) -> Self {
        Tag(vec![name.to_string(), value.into()])
    }

    /// Tag name, e.g. `u` for `["u", "https://..."]`.
    pub fn name(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// First value after the name.
    pub fn value(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }
}

/// Signed Nostr event as exchanged with relays.
///
/// ```json
/// {
///   "id": "aa11",
///   "pubkey": "79be...",
///   "kind": 27235,
///   "created_at": 1700000000,
///   "tags": [["u", "https://relay.example"], ["method", "POST"]],
///   "content": "",
///   "sig": "deadbeef"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Event identifier (hex of SHA-256 hash).
    pub id: String,
    /// Author public key (hex, x-only).
    pub pubkey: String,
    /// Kind number, e.g. `1` or `27235`.
    pub kind: u32,
    /// Unix timestamp of creation.
    pub created_at: u64,
    /// Tags as arrays of strings, name first.
    pub tags: Vec<Tag>,
    /// Arbitrary text payload.
    pub content: String,
    /// Schnorr signature over the event hash.
    pub sig: String,
}

/// Event fields before an id and signature are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedEvent {
    pub kind: u32,
    pub created_at: u64,
    pub tags: Vec<Tag>,
    pub content: String,
}

impl UnsignedEvent {
    /// First value of the first tag named `name`.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        find_tag(&self.tags, name)
    }
}

impl Event {
    /// First value of the first tag named `name`.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        find_tag(&self.tags, name)
    }

    /// Verify the event's ID and Schnorr signature.
    pub fn verify(&self) -> Result<()> {
        let hash = event_hash(&self.pubkey, self.created_at, self.kind, &self.tags, &self.content)?;
        if hex::encode(hash) != self.id {
            return Err(Error::Invalid("id mismatch".into()));
        }
        let bad = |e: String| Error::Invalid(format!("bad signature: {e}"));
        let sig_bytes = hex::decode(&self.sig).map_err(|e| bad(e.to_string()))?;
        let pk_bytes = hex::decode(&self.pubkey).map_err(|e| bad(e.to_string()))?;
        let sig = Signature::from_slice(&sig_bytes).map_err(|e| bad(e.to_string()))?;
        let pk = XOnlyPublicKey::from_slice(&pk_bytes).map_err(|e| bad(e.to_string()))?;
        let msg = Message::from_digest_slice(&hash).map_err(|e| bad(e.to_string()))?;
        Secp256k1::verification_only()
            .verify_schnorr(&sig, &msg, &pk)
            .map_err(|e| bad(e.to_string()))
    }
}

fn find_tag<'a>(tags: &'a [Tag], name: &str) -> Option<&'a str> {
    tags.iter()
        .find(|t| t.name() == Some(name))
        .and_then(Tag::value)
}

/// Compute the NIP-01 event hash: SHA-256 of
/// `[0, pubkey, created_at, kind, tags, content]`.
pub fn event_hash(
    pubkey: &str,
    created_at: u64,
    kind: u32,
    tags: &[Tag],
    content: &str,
) -> Result<[u8; 32]> {
    let arr = serde_json::json!([0, pubkey, created_at, kind, tags, content]);
    let data = serde_json::to_vec(&arr)?;
    Ok(Sha256::digest(&data).into())
}
