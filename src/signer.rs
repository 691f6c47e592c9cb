//! Signer capability used to authenticate administrative requests.
//!
//! Callers receive a signer explicitly (usually as `Option<Arc<dyn Signer>>`)
//! instead of looking one up globally, so tests can swap in fakes.

use async_trait::async_trait;
use secp256k1::{Keypair, Message, Secp256k1, SecretKey};

use crate::{
    error::{Error, Result},
    event::{event_hash, Event, UnsignedEvent},
};

/// Something that holds the operator's key and can sign events with it.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Hex x-only public key of the operator.
    async fn public_key(&self) -> Result<String>;

    /// Attach `id`, `pubkey` and `sig` to `unsigned`.
    async fn sign_event(&self, unsigned: UnsignedEvent) -> Result<Event>;
}

/// Signer backed by a secret key loaded from configuration.
pub struct KeySigner {
    secp: Secp256k1<secp256k1::All>,
    keypair: Keypair,
}

impl KeySigner {
    /// Build a signer from a 64-character hex secret key.
    pub fn from_hex(secret: &str) -> Result<Self> {
        let bytes = hex::decode(secret.trim())
            .map_err(|e| Error::Signer(format!("secret key is not hex: {e}")))?;
        let sk = SecretKey::from_slice(&bytes)
            .map_err(|e| Error::Signer(format!("invalid secret key: {e}")))?;
        let secp = Secp256k1::new();
        let keypair = Keypair::from_secret_key(&secp, &sk);
        Ok(Self { secp, keypair })
    }

    fn pubkey_hex(&self) -> String {
        hex::encode(self.keypair.x_only_public_key().0.serialize())
    }
}

#[async_trait]
impl Signer for KeySigner {
    async fn public_key(&self) -> Result<String> {
        Ok(self.pubkey_hex())
    }

    async fn sign_event(&self, unsigned: UnsignedEvent) -> Result<Event> {
        let pubkey = self.pubkey_hex();
        let hash = event_hash(
            &pubkey,
            unsigned.created_at,
            unsigned.kind,
            &unsigned.tags,
            &unsigned.content,
        )?;
        let msg = Message::from_digest_slice(&hash).map_err(|e| Error::Signer(e.to_string()))?;
        let sig = self.secp.sign_schnorr_no_aux_rand(&msg, &self.keypair);
        Ok(Event {
            id: hex::encode(hash),
            pubkey,
            kind: unsigned.kind,
            created_at: unsigned.created_at,
            tags: unsigned.tags,
            content: unsigned.content,
            sig: hex::encode(sig.as_ref()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Tag;

    const SECRET: &str = "0101010101010101010101010101010101010101010101010101010101010101";

    #[tokio::test]
    async fn signs_verifiable_events() {
        let signer = KeySigner::from_hex(SECRET).unwrap();
        let ev = signer
            .sign_event(UnsignedEvent {
                kind: 27235,
                created_at: 1_700_000_000,
                tags: vec![Tag::pair("u", "https://relay.example/")],
                content: String::new(),
            })
            .await
            .unwrap();
        ev.verify().unwrap();
        assert_eq!(ev.pubkey, signer.public_key().await.unwrap());
        assert_eq!(ev.tag_value("u"), Some("https://relay.example/"));
    }

    #[tokio::test]
    async fn public_key_is_x_only_hex() {
        let signer = KeySigner::from_hex(SECRET).unwrap();
        let pk = signer.public_key().await.unwrap();
        assert_eq!(pk.len(), 64);
        assert!(pk.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(matches!(KeySigner::from_hex("zz"), Err(Error::Signer(_))));
        assert!(matches!(KeySigner::from_hex(&"00".repeat(32)), Err(Error::Signer(_))));
        assert!(KeySigner::from_hex(&format!(" {SECRET}\n")).is_ok());
    }
}
