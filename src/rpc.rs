//! Administrative RPC over HTTP (NIP-86).
//!
//! Every call is one linear exchange: serialize `{method, params}`, sign a
//! NIP-98 attestation over that exact body, POST it, then unwrap `result` or
//! fail on `error`. Nothing is retried and no idempotency key is sent, so a
//! call that is cancelled in flight may or may not have been applied by the
//! relay.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    auth,
    error::{self, Error, Result},
    signer::Signer,
};

/// Content type expected by relays for management calls.
pub const CONTENT_TYPE: &str = "application/nostr+json+rpc";

/// Request envelope. `None` params keep their position and serialize as `null`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcRequest {
    pub method: String,
    pub params: Vec<Option<Value>>,
}


/// Translate a relay's WebSocket address into the HTTP(S) address used for
/// administrative calls. `http`/`https` addresses pass through unchanged and
/// the rest of the address (host, port, path) is kept verbatim.
pub fn http_url(relay: &str) -> Result<String> {
    let relay = relay.trim();
    let unsupported = || Error::Invalid(format!("unsupported relay address: {relay}"));
    let (scheme, rest) = relay.split_once("://").ok_or_else(unsupported)?;
    // Schemes are case-insensitive; the rest of the address is kept as given.
    let converted = match scheme.to_ascii_lowercase().as_str() {
        "wss" | "https" => format!("https://{rest}"),
        "ws" | "http" => format!("http://{rest}"),
        _ => return Err(unsupported()),
    };
    let parsed = url::Url::parse(&converted)
        .map_err(|e| Error::Invalid(format!("bad relay address {relay}: {e}")))?;
    if parsed.host_str().is_none() {
        return Err(Error::Invalid(format!("relay address has no host: {relay}")));
    }
    Ok(converted)
}

/// Client for one relay's management endpoint.
#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    signer: Option<Arc<dyn Signer>>,
}

impl RpcClient {
    /// Create a client for `relay` (a `ws://`/`wss://` or `http(s)://` address).
    pub fn new(relay: &str, signer: Option<Arc<dyn Signer>>) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            url: http_url(relay)?,
            signer,
        })
    }

    /// HTTP address calls are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Invoke `method` with positional `params` and return the raw `result`.
    pub async fn call(&self, method: &str, params: Vec<Option<Value>>) -> Result<Value> {
        let request = RpcRequest {
            method: method.to_string(),
            params,
        };
        let body = serde_json::to_string(&request)?;
        let authorization =
            auth::auth_header(self.signer.as_deref(), &self.url, "POST", Some(&body)).await?;

        debug!(method, url = %self.url, "admin call");
        let resp = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .body(body)
            .send()
            .await
            .map_err(|e| error::from_request(&self.url, e))?;

        let status = resp.status().as_u16();
        if status >= 300 {
            return Err(Error::Http { status });
        }
        let text = resp
            .text()
            .await
            .map_err(|e| error::from_request(&self.url, e))?;
        // Either `result` or `error` is meaningful; anything but an object is malformed.
        let mut envelope: Map<String, Value> = serde_json::from_str(&text)?;
        match envelope.remove("error") {
            None | Some(Value::Null) => Ok(envelope.remove("result").unwrap_or(Value::Null)),
            Some(Value::String(msg)) => Err(Error::Rpc(msg)),
            Some(other) => Err(Error::Rpc(other.to_string())),
        }
    }
}
