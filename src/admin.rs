//! Typed NIP-86 management methods.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::Result,
    rpc::RpcClient,
};

/// Banned or allowed public key as reported by the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PubkeyEntry {
    pub pubkey: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Banned event or event awaiting moderation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Blocked IP address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IpEntry {
    pub ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Management sub-client wrapping an [`RpcClient`].
#[derive(Clone)]
pub struct Admin {
    rpc: RpcClient,
}

fn text(s: &str) -> Option<Value> {
    Some(Value::String(s.to_string()))
}

fn reason(r: Option<&str>) -> Option<Value> {
    r.map(|r| Value::String(r.to_string()))
}

impl Admin {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    /// Method names the relay claims to support.
    pub async fn supported_methods(&self) -> Result<Vec<String>> {
        self.list("supportedmethods").await
    }


    pub async fn ban_pubkey(&self, pubkey: &str, why: Option<&str>) -> Result<()> {
        self.ack("banpubkey", vec![text(pubkey), reason(why)]).await
    }

    pub async fn unban_pubkey(&self, pubkey: &str, why: Option<&str>) -> Result<()> {
        self.ack("unbanpubkey", vec![text(pubkey), reason(why)]).await
    }

    pub async fn list_banned_pubkeys(&self) -> Result<Vec<PubkeyEntry>> {
        self.list("listbannedpubkeys").await
    }

    pub async fn allow_pubkey(&self, pubkey: &str, why: Option<&str>) -> Result<()> {
        self.ack("allowpubkey", vec![text(pubkey), reason(why)]).await
    }

    pub async fn unallow_pubkey(&self, pubkey: &str, why: Option<&str>) -> Result<()> {
        self.ack("unallowpubkey", vec![text(pubkey), reason(why)]).await
    }

    pub async fn list_allowed_pubkeys(&self) -> Result<Vec<PubkeyEntry>> {
        self.list("listallowedpubkeys").await
    }


    pub async fn list_events_needing_moderation(&self) -> Result<Vec<EventEntry>> {
        self.list("listeventsneedingmoderation").await
    }

    pub async fn allow_event(&self, id: &str, why: Option<&str>) -> Result<()> {
        self.ack("allowevent", vec![text(id), reason(why)]).await
    }

    pub async fn ban_event(&self, id: &str, why: Option<&str>) -> Result<()> {
        self.ack("banevent", vec![text(id), reason(why)]).await
    }

    pub async fn list_banned_events(&self) -> Result<Vec<EventEntry>> {
        self.list("listbannedevents").await
    }


    pub async fn change_relay_name(&self, name: &str) -> Result<()> {
        self.ack("changerelayname", vec![text(name)]).await
    }

    pub async fn change_relay_description(&self, description: &str) -> Result<()> {
        self.ack("changerelaydescription", vec![text(description)]).await
    }

    pub async fn change_relay_icon(&self, url: &str) -> Result<()> {
        self.ack("changerelayicon", vec![text(url)]).await
    }


    pub async fn allow_kind(&self, kind: u32) -> Result<()> {
        self.ack("allowkind", vec![Some(Value::from(kind))]).await
    }

    pub async fn disallow_kind(&self, kind: u32) -> Result<()> {
        self.ack("disallowkind", vec![Some(Value::from(kind))]).await
    }

    pub async fn list_allowed_kinds(&self) -> Result<Vec<u32>> {
        self.list("listallowedkinds").await
    }


    pub async fn block_ip(&self, ip: &str, why: Option<&str>) -> Result<()> {
        self.ack("blockip", vec![text(ip), reason(why)]).await
    }

    pub async fn unblock_ip(&self, ip: &str) -> Result<()> {
        self.ack("unblockip", vec![text(ip)]).await
    }

    pub async fn list_blocked_ips(&self) -> Result<Vec<IpEntry>> {
        self.list("listblockedips").await
    }

    /// Call a list method. A `null` result is treated as an empty list.
    async fn list<T: DeserializeOwned>(&self, method: &str) -> Result<Vec<T>> {
        match self.rpc.call(method, vec![]).await? {
            Value::Null => Ok(vec![]),
            value => Ok(serde_json::from_value(value)?),
        }
    }

    /// Call a mutating method. Relays answer `true`; the value is not checked.
    async fn ack(&self, method: &str, params: Vec<Option<Value>>) -> Result<()> {
        self.rpc.call(method, params).await?;
        Ok(())
    }
}
