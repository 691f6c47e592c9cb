//! Operator input checks run before any request is attempted.

use std::net::IpAddr;

use url::Url;

use crate::error::{Error, Result};

/// Accept a 64-character hex pubkey or event id and return it lowercased.
pub fn hex_id(label: &str, input: &str) -> Result<String> {
    let s = input.trim();
    if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::Invalid(format!(
            "{label} must be 64 hex characters, got {input:?}"
        )));
    }
    Ok(s.to_ascii_lowercase())
}

pub fn pubkey(input: &str) -> Result<String> {
    hex_id("pubkey", input)
}

pub fn event_id(input: &str) -> Result<String> {
    hex_id("event id", input)
}

/// Parse an IPv4 or IPv6 address and return its canonical text form.
pub fn ip(input: &str) -> Result<String> {
    input
        .trim()
        .parse::<IpAddr>()
        .map(|addr| addr.to_string())
        .map_err(|_| Error::Invalid(format!("not an IP address: {input:?}")))
}

/// Event kinds are 16-bit in practice.
pub fn kind(input: &str) -> Result<u32> {
    input
        .trim()
        .parse::<u16>()
        .map(u32::from)
        .map_err(|_| Error::Invalid(format!("kind must be an integer 0-65535, got {input:?}")))
}

/// Relay addresses must be ws/wss/http/https URLs with a host.
pub fn relay_url(input: &str) -> Result<String> {
    let s = input.trim();
    let url = Url::parse(s).map_err(|e| Error::Invalid(format!("bad relay URL {s:?}: {e}")))?;
    if !matches!(url.scheme(), "ws" | "wss" | "http" | "https") {
        return Err(Error::Invalid(format!(
            "relay URL must use ws, wss, http or https: {s:?}"
        )));
    }
    if url.host_str().is_none() {
        return Err(Error::Invalid(format!("relay URL has no host: {s:?}")));
    }
    // Store the scheme lowercased so later prefix rewrites see `ws`/`wss`.
    let (_, rest) = s
        .split_once("://")
        .ok_or_else(|| Error::Invalid(format!("relay URL needs scheme://host: {s:?}")))?;
    Ok(format!("{}://{rest}", url.scheme()))
}
