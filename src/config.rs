//! Configuration loading from `.env` files.

use std::{env, sync::Arc};

use anyhow::{Context, Result};

use crate::{
    feed::FeedOptions,
    signer::{KeySigner, Signer},
};

/// Default number of events requested by `events`.
pub const DEFAULT_FEED_LIMIT: u32 = 100;

/// Runtime settings derived from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Relay address, e.g. `wss://relay.example`.
    pub relay_url: Option<String>,
    /// Hex secret key for signing admin requests. No signer when absent.
    pub secret_key: Option<String>,
    /// Optional Tor SOCKS proxy (host:port) for the event feed.
    pub tor_socks: Option<String>,
    /// Kinds requested by `events` when none are given on the command line.
    pub feed_kinds: Vec<u32>,
    /// Authors requested by `events` when none are given on the command line.
    pub feed_authors: Vec<String>,
    /// Default event limit.
    pub feed_limit: u32,
    /// Verify Schnorr signatures of feed events.
    pub verify_sig: bool,
}

impl Settings {
    /// Load settings from the specified `.env` file.
    pub fn from_env(path: &str) -> Result<Self> {
        dotenvy::from_filename(path).context("reading env file")?;
        let relay_url = non_empty(env::var("RELAY_URL").ok());
        let secret_key = non_empty(env::var("SECRET_KEY").ok());
        let tor_socks = non_empty(env::var("TOR_SOCKS").ok());
        let feed_kinds = csv_u32(env::var("FEED_KINDS").unwrap_or_else(|_| "1".into()));
        let feed_authors = csv_strings(env::var("FEED_AUTHORS").unwrap_or_default());
        let feed_limit = env::var("FEED_LIMIT")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_FEED_LIMIT);
        let verify_sig = env::var("VERIFY_SIG").unwrap_or_else(|_| "0".into()) == "1";
        Ok(Self {
            relay_url,
            secret_key,
            tor_socks,
            feed_kinds,
            feed_authors,
            feed_limit,
            verify_sig,
        })
    }

    /// Build the configured signer, if any.
    pub fn signer(&self) -> Result<Option<Arc<dyn Signer>>> {
        match &self.secret_key {
            Some(key) => {
                let signer = KeySigner::from_hex(key).context("loading SECRET_KEY")?;
                Ok(Some(Arc::new(signer)))
            }
            None => Ok(None),
        }
    }

    pub fn feed_options(&self) -> FeedOptions {
        FeedOptions {
            tor_socks: self.tor_socks.clone(),
            verify_sig: self.verify_sig,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Split a comma-separated string into trimmed string values.
pub fn csv_strings(input: impl AsRef<str>) -> Vec<String> {
    let s = input.as_ref();
    s.split(',')
        .filter_map(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .collect()
}

/// Split a comma-separated string into `u32` values, skipping invalid entries.
pub fn csv_u32(input: impl AsRef<str>) -> Vec<u32> {
    let s = input.as_ref();
    s.split(',').filter_map(|s| s.trim().parse().ok()).collect()
}

/// Serializes tests that touch process environment variables.
#[cfg(test)]
pub(crate) static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
pub(crate) const ENV_VARS: [&str; 7] = [
    "RELAY_URL",
    "SECRET_KEY",
    "TOR_SOCKS",
    "FEED_KINDS",
    "FEED_AUTHORS",
    "FEED_LIMIT",
    "VERIFY_SIG",
];

/// Take the env lock and clear every variable `Settings` reads.
#[cfg(test)]
pub(crate) fn lock_clean_env() -> std::sync::MutexGuard<'static, ()> {
    let guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    for v in ENV_VARS {
        env::remove_var(v);
    }
    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const SECRET: &str = "0101010101010101010101010101010101010101010101010101010101010101";

    #[test]
    fn loads_env() {
        let _g = lock_clean_env();
        let dir = tempdir().unwrap();
        let env_path = dir.path().join(".env");
        fs::write(
            &env_path,
            format!(
                concat!(
                    "RELAY_URL=wss://relay.example\n",
                    "SECRET_KEY={}\n",
                    "TOR_SOCKS=127.0.0.1:9050\n",
                    "FEED_KINDS=1,30023\n",
                    "FEED_AUTHORS=a1, a2\n",
                    "FEED_LIMIT=25\n",
                    "VERIFY_SIG=1\n"
                ),
                SECRET
            ),
        )
        .unwrap();
        let cfg = Settings::from_env(env_path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.relay_url.as_deref(), Some("wss://relay.example"));
        assert_eq!(cfg.secret_key.as_deref(), Some(SECRET));
        assert_eq!(cfg.tor_socks.as_deref(), Some("127.0.0.1:9050"));
        assert_eq!(cfg.feed_kinds, vec![1, 30023]);
        assert_eq!(cfg.feed_authors, vec!["a1", "a2"]);
        assert_eq!(cfg.feed_limit, 25);
        assert!(cfg.verify_sig);
        assert!(cfg.signer().unwrap().is_some());
        let opts = cfg.feed_options();
        assert_eq!(opts.tor_socks.as_deref(), Some("127.0.0.1:9050"));
        assert!(opts.verify_sig);
    }

    #[test]
    fn defaults_when_optional_absent() {
        let _g = lock_clean_env();
        let dir = tempdir().unwrap();
        let env_path = dir.path().join(".env");
        fs::write(&env_path, "RELAY_URL=\nSECRET_KEY=\nTOR_SOCKS=\n").unwrap();
        let cfg = Settings::from_env(env_path.to_str().unwrap()).unwrap();
        assert!(cfg.relay_url.is_none());
        assert!(cfg.secret_key.is_none());
        assert!(cfg.tor_socks.is_none());
        assert_eq!(cfg.feed_kinds, vec![1]);
        assert!(cfg.feed_authors.is_empty());
        assert_eq!(cfg.feed_limit, DEFAULT_FEED_LIMIT);
        assert!(!cfg.verify_sig);
        assert!(cfg.signer().unwrap().is_none());
    }

    #[test]
    fn empty_kinds_means_all_kinds() {
        let _g = lock_clean_env();
        let dir = tempdir().unwrap();
        let env_path = dir.path().join(".env");
        fs::write(&env_path, "FEED_KINDS=\nFEED_LIMIT=lots\n").unwrap();
        let cfg = Settings::from_env(env_path.to_str().unwrap()).unwrap();
        assert!(cfg.feed_kinds.is_empty());
        assert_eq!(cfg.feed_limit, DEFAULT_FEED_LIMIT);
    }

    #[test]
    fn bad_secret_key_errors_on_signer() {
        let _g = lock_clean_env();
        let dir = tempdir().unwrap();
        let env_path = dir.path().join(".env");
        fs::write(&env_path, "SECRET_KEY=not-a-key\n").unwrap();
        let cfg = Settings::from_env(env_path.to_str().unwrap()).unwrap();
        assert!(cfg.signer().is_err());
    }

    #[test]
    fn missing_env_file_errors() {
        let _g = lock_clean_env();
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.env");
        assert!(Settings::from_env(missing.to_str().unwrap()).is_err());
    }

    #[test]
    fn csv_helpers() {
        assert_eq!(csv_strings("a, b , ,c"), vec!["a", "b", "c"]);
        assert!(csv_strings("").is_empty());
        assert_eq!(csv_u32("1, 2, x,3"), vec![1, 2, 3]);
        assert!(csv_u32("").is_empty());
    }
}
