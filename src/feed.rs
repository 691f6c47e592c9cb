//! Event feed: read events from a relay over a NIP-01 WebSocket subscription.

use std::{
    cmp::Reverse,
    collections::{HashSet, VecDeque},
    ops::ControlFlow,
};

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{client_async_tls, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

use crate::{
    error::{Error, Result},
    event::Event,
};

const SUBSCRIPTION_ID: &str = "relaydeck";

/// How many recent event ids a subscription remembers for dedup.
const SEEN_WINDOW: usize = 10_000;

type RelaySocket = WebSocketStream<MaybeTlsStream<Box<dyn AsyncReadWrite + Unpin + Send>>>;

/// Subscription filter sent in the `REQ`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Filter {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Connection options shared by `fetch` and `follow`.
#[derive(Debug, Clone, Default)]
pub struct FeedOptions {
    /// Optional SOCKS5 proxy (host:port).
    pub tor_socks: Option<String>,
    /// Drop events whose id or signature does not verify.
    pub verify_sig: bool,
}

/// Message received from a relay, as far as the feed cares.
#[derive(Debug, PartialEq)]
enum RelayMessage {
    Event(String, Box<Event>),
    Eose(String),
    Closed(String, String),
    Notice(String),
}

impl RelayMessage {
    fn parse(txt: &str) -> Option<Self> {
        let val: Value = serde_json::from_str(txt).ok()?;
        let arr = val.as_array()?;
        let text_at = |i: usize| arr.get(i).and_then(|v| v.as_str()).map(str::to_string);
        match arr.first().and_then(|v| v.as_str()) {
            Some("EVENT") if arr.len() >= 3 => {
                let ev = serde_json::from_value(arr[2].clone()).ok()?;
                Some(Self::Event(text_at(1)?, Box::new(ev)))
            }
            Some("EOSE") => Some(Self::Eose(text_at(1)?)),
            Some("CLOSED") => Some(Self::Closed(text_at(1)?, text_at(2).unwrap_or_default())),
            Some("NOTICE") => Some(Self::Notice(text_at(1).unwrap_or_default())),
            _ => None,
        }
    }
}

/// Item yielded by an open subscription.
enum FeedItem {
    Event(Event),
    Eose,
}

/// Most recent event ids, oldest evicted first.
struct RecentIds {
    capacity: usize,
    ids: HashSet<String>,
    order: VecDeque<String>,
}

impl RecentIds {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ids: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    /// Record `id`; false if it is already in the window.
    fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.ids.insert(id.to_string());
        self.order.push_back(id.to_string());
        true
    }
}

/// Open `REQ` on a relay connection.
struct Subscription {
    ws: RelaySocket,
    verify_sig: bool,
    seen: RecentIds,
}

impl Subscription {
    async fn open(relay: &str, filter: &Filter, opts: &FeedOptions) -> Result<Self> {
        let mut ws = connect_ws(&ws_url(relay), opts.tor_socks.as_deref()).await?;
        let req = json!(["REQ", SUBSCRIPTION_ID, filter]);
        debug!(relay, %req, "subscribing");
        ws.send(Message::Text(req.to_string())).await?;
        Ok(Self {
            ws,
            verify_sig: opts.verify_sig,
            seen: RecentIds::new(SEEN_WINDOW),
        })
    }

    /// Next event or end-of-stored-events marker. `None` once the relay hangs up.
    async fn next(&mut self) -> Result<Option<FeedItem>> {
        while let Some(msg) = self.ws.next().await {
            let txt = match msg? {
                Message::Text(txt) => txt,
                Message::Close(_) => return Ok(None),
                _ => continue,
            };
            match RelayMessage::parse(&txt) {
                Some(RelayMessage::Event(sub, ev)) if sub == SUBSCRIPTION_ID => {
                    if self.verify_sig {
                        if let Err(e) = ev.verify() {
                            warn!(id = %ev.id, "dropping event: {e}");
                            continue;
                        }
                    }
                    if self.seen.insert(&ev.id) {
                        return Ok(Some(FeedItem::Event(*ev)));
                    }
                }
                Some(RelayMessage::Eose(sub)) if sub == SUBSCRIPTION_ID => {
                    return Ok(Some(FeedItem::Eose))
                }
                Some(RelayMessage::Closed(sub, reason)) if sub == SUBSCRIPTION_ID => {
                    return Err(Error::Closed(reason));
                }
                Some(RelayMessage::Notice(notice)) => warn!("relay notice: {notice}"),
                _ => {}
            }
        }
        Ok(None)
    }

    async fn close(mut self) {
        let close = json!(["CLOSE", SUBSCRIPTION_ID]);
        let _ = self.ws.send(Message::Text(close.to_string())).await;
        let _ = self.ws.close(None).await;
    }
}

/// Fetch stored events matching `filter`, newest first.
pub async fn fetch(relay: &str, filter: &Filter, opts: &FeedOptions) -> Result<Vec<Event>> {
    let mut sub = Subscription::open(relay, filter, opts).await?;
    let mut events = vec![];
    while let Some(item) = sub.next().await? {
        match item {
            FeedItem::Event(ev) => events.push(ev),
            FeedItem::Eose => break,
        }
    }
    sub.close().await;
    events.sort_by_key(|e| Reverse(e.created_at));
    Ok(events)
}

/// Stream events to `on_event`: stored events oldest first, then live events
/// as they arrive. Ends when the relay closes the connection, or when
/// `on_event` breaks, in which case the subscription is closed.
pub async fn follow(
    relay: &str,
    filter: &Filter,
    opts: &FeedOptions,
    mut on_event: impl FnMut(&Event) -> ControlFlow<()>,
) -> Result<()> {
    let mut sub = Subscription::open(relay, filter, opts).await?;
    let mut backlog = Some(vec![]);
    loop {
        let Some(item) = sub.next().await? else {
            // Relay hung up, possibly before EOSE.
            let _ = flush_backlog(&mut backlog, &mut on_event);
            return Ok(());
        };
        let flow = match item {
            FeedItem::Event(ev) => match backlog.as_mut() {
                Some(stored) => {
                    stored.push(ev);
                    ControlFlow::Continue(())
                }
                None => on_event(&ev),
            },
            FeedItem::Eose => flush_backlog(&mut backlog, &mut on_event),
        };
        if flow.is_break() {
            debug!(relay, "feed consumer stopped");
            sub.close().await;
            return Ok(());
        }
    }
}

fn flush_backlog(
    backlog: &mut Option<Vec<Event>>,
    on_event: &mut impl FnMut(&Event) -> ControlFlow<()>,
) -> ControlFlow<()> {
    if let Some(mut stored) = backlog.take() {
        stored.sort_by_key(|e| e.created_at);
        for ev in &stored {
            if on_event(ev).is_break() {
                return ControlFlow::Break(());
            }
        }
    }
    ControlFlow::Continue(())
}

/// Map `http(s)` relay addresses to their WebSocket form.
fn ws_url(relay: &str) -> String {
    let relay = relay.trim();
    match relay.split_once("://") {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("https") => format!("wss://{rest}"),
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("http") => format!("ws://{rest}"),
        _ => relay.to_string(),
    }
}

/// Establish a WebSocket connection, optionally via a SOCKS5 proxy.
/// `wss` addresses get TLS on top of whichever stream was opened.
async fn connect_ws(relay: &str, tor_socks: Option<&str>) -> Result<RelaySocket> {
    let url = Url::parse(relay).map_err(|e| Error::Invalid(format!("bad relay address: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| Error::Invalid("missing host".into()))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| Error::Invalid("missing port".into()))?;
    let req = relay.into_client_request()?;
    let unreachable = |e: std::io::Error| Error::Unreachable(format!("{relay}: {e}"));
    let stream: Box<dyn AsyncReadWrite + Unpin + Send> = if let Some(proxy) = tor_socks {
        Box::new(
            Socks5Stream::connect(proxy, (host, port))
                .await
                .map_err(|e| Error::Unreachable(format!("{relay} via {proxy}: {e}")))?,
        )
    } else {
        Box::new(TcpStream::connect((host, port)).await.map_err(unreachable)?)
    };
    let (ws, _) = client_async_tls(req, stream).await?;
    Ok(ws)
}

/// Blanket trait for boxed async read/write streams.
trait AsyncReadWrite: AsyncRead + AsyncWrite {}
impl<T: AsyncRead + AsyncWrite> AsyncReadWrite for T {}
