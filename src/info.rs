//! Relay information document (NIP-11) and admin endpoint preflight checks.

use reqwest::header::{self, HeaderMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{
    error::{self, Error, Result},
    rpc::http_url,
};

/// NIP-11 relay information document. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RelayInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Administrative contact pubkey.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub supported_nips: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limitation: Option<Limitation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fees: Option<Fees>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retention: Vec<Retention>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relay_countries: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub language_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posting_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payments_url: Option<String>,
}

/// Server-imposed limits advertised in `limitation`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Limitation {
    pub max_message_length: Option<u64>,
    pub max_subscriptions: Option<u64>,
    pub max_filters: Option<u64>,
    pub max_limit: Option<u64>,
    pub max_subid_length: Option<u64>,
    pub max_event_tags: Option<u64>,
    pub max_content_length: Option<u64>,
    pub min_pow_difficulty: Option<u64>,
    pub auth_required: Option<bool>,
    pub payment_required: Option<bool>,
    pub restricted_writes: Option<bool>,
    pub created_at_lower_limit: Option<u64>,
    pub created_at_upper_limit: Option<u64>,
}

/// Fee schedule grouped by what is being paid for.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Fees {
    #[serde(default)]
    pub admission: Vec<Fee>,
    #[serde(default)]
    pub subscription: Vec<Fee>,
    #[serde(default)]
    pub publication: Vec<Fee>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fee {
    pub amount: u64,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u32>>,
}

/// Retention rule. `kinds` may mix single kinds and `[start, end]` ranges.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Retention {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

/// Fetch the relay information document. No authentication is involved.
pub async fn fetch_info(http: &reqwest::Client, relay: &str) -> Result<RelayInfo> {
    let url = http_url(relay)?;
    debug!(%url, "fetching relay info");
    let resp = http
        .get(&url)
        .header(header::ACCEPT, "application/nostr+json")
        .send()
        .await
        .map_err(|e| error::from_request(&url, e))?;
    let status = resp.status().as_u16();
    if status >= 300 {
        return Err(Error::Http { status });
    }
    let text = resp.text().await.map_err(|e| error::from_request(&url, e))?;
    Ok(serde_json::from_str(&text)?)
}

/// Outcome of a CORS preflight against the admin endpoint.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CorsReport {
    pub origin: String,
    pub status: u16,
    pub allow_origin: Option<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
}

impl CorsReport {
    fn from_headers(origin: &str, status: u16, headers: &HeaderMap) -> Self {
        let get = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let list = |name: header::HeaderName| {
            get(name)
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_ascii_lowercase())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default()
        };
        Self {
            origin: origin.to_string(),
            status,
            allow_origin: get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            allow_methods: list(header::ACCESS_CONTROL_ALLOW_METHODS),
            allow_headers: list(header::ACCESS_CONTROL_ALLOW_HEADERS),
        }
    }

    /// Reasons a browser at `origin` would be blocked. Empty when allowed.
    pub fn problems(&self) -> Vec<String> {
        let mut out = vec![];
        if self.status >= 300 {
            out.push(format!("preflight answered HTTP {}", self.status));
        }
        match self.allow_origin.as_deref() {
            Some("*") => {}
            Some(o) if o == self.origin => {}
            Some(o) => out.push(format!("Access-Control-Allow-Origin is {o}")),
            None => out.push("no Access-Control-Allow-Origin header".into()),
        }
        // POST is a safelisted method, so an absent list is fine.
        if !self.allow_methods.is_empty()
            && !self.allow_methods.iter().any(|m| m == "post" || m == "*")
        {
            out.push("POST not in Access-Control-Allow-Methods".into());
        }
        // A `*` wildcard never covers Authorization.
        if !self.allow_headers.iter().any(|h| h == "authorization") {
            out.push("Authorization not in Access-Control-Allow-Headers".into());
        }
        if !self
            .allow_headers
            .iter()
            .any(|h| h == "content-type" || h == "*")
        {
            out.push("Content-Type not in Access-Control-Allow-Headers".into());
        }
        out
    }

    pub fn allowed(&self) -> bool {
        self.problems().is_empty()
    }
}

/// Send the preflight a browser dashboard served from `origin` would send
/// before an admin call, and report what the relay answered.
pub async fn probe_cors(http: &reqwest::Client, relay: &str, origin: &str) -> Result<CorsReport> {
    let url = http_url(relay)?;
    debug!(%url, origin, "sending CORS preflight");
    let resp = http
        .request(reqwest::Method::OPTIONS, &url)
        .header(header::ORIGIN, origin)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(
            header::ACCESS_CONTROL_REQUEST_HEADERS,
            "authorization, content-type",
        )
        .send()
        .await
        .map_err(|e| error::from_request(&url, e))?;
    Ok(CorsReport::from_headers(
        origin,
        resp.status().as_u16(),
        resp.headers(),
    ))
}
