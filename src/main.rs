//! Command line console for relay operators. Shows relay information and
//! event feeds, and issues NIP-86 moderation and configuration calls signed
//! with NIP-98 HTTP auth.

mod admin;
mod auth;
mod config;
mod error;
mod event;
mod feed;
mod info;
mod rpc;
mod signer;
mod validate;

use std::{fs, future::Future, io::Write, ops::ControlFlow, path::Path};

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use config::Settings;
use serde::Serialize;
use serde_json::Value;

use crate::{admin::Admin, event::Event, rpc::RpcClient};

/// Command line interface entry point.
#[derive(Parser)]
#[command(
    name = "relaydeck",
    author,
    version,
    about = "Operator console for Nostr relays"
)]
struct Cli {
    /// Path to the `.env` configuration file.
    #[arg(long, default_value = ".env")]
    env: String,
    /// Relay address, overriding `RELAY_URL`.
    #[arg(long)]
    relay: Option<String>,
    /// Print results as JSON.
    #[arg(long)]
    json: bool,
    /// Log requests to stderr.
    #[arg(short, long)]
    verbose: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Create the default env file.
    Init,
    /// Store the preferred relay in the env file.
    Use { url: String },
    /// Print the operator public key used for signing.
    Whoami,
    /// Show the relay information document.
    Info,
    /// Check whether a browser dashboard at ORIGIN may call the admin API.
    Cors {
        #[arg(long, default_value = "http://localhost:5173")]
        origin: String,
    },
    /// List recent events, or keep streaming with `--follow`.
    Events {
        #[arg(long = "kind")]
        kinds: Vec<String>,
        #[arg(long = "author")]
        authors: Vec<String>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        since: Option<u64>,
        #[arg(long)]
        follow: bool,
    },
    /// List the management methods the relay supports.
    Methods,
    /// Call any management method. Params are parsed as JSON, else taken as strings.
    Call { method: String, params: Vec<String> },
    /// Ban, allow, and list public keys.
    Pubkey {
        #[command(subcommand)]
        action: PubkeyAction,
    },
    /// Ban, allow, and list events.
    Event {
        #[command(subcommand)]
        action: EventAction,
    },
    /// Manage allowed event kinds.
    Kind {
        #[command(subcommand)]
        action: KindAction,
    },
    /// Block and unblock IP addresses.
    Ip {
        #[command(subcommand)]
        action: IpAction,
    },
    /// Change relay metadata.
    Relay {
        #[command(subcommand)]
        action: RelayAction,
    },
}

#[derive(Subcommand)]
enum PubkeyAction {
    Ban {
        pubkey: String,
        #[arg(long)]
        reason: Option<String>,
    },
    Unban {
        pubkey: String,
        #[arg(long)]
        reason: Option<String>,
    },
    Allow {
        pubkey: String,
        #[arg(long)]
        reason: Option<String>,
    },
    Unallow {
        pubkey: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// List banned public keys.
    Banned,
    /// List allowed public keys.
    Allowed,
}

#[derive(Subcommand)]
enum EventAction {
    Ban {
        id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    Allow {
        id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// List banned events.
    Banned,
    /// List events waiting for moderation.
    Pending,
}

#[derive(Subcommand)]
enum KindAction {
    Allow { kind: String },
    Disallow { kind: String },
    List,
}

#[derive(Subcommand)]
enum IpAction {
    Block {
        ip: String,
        #[arg(long)]
        reason: Option<String>,
    },
    Unblock { ip: String },
    List,
}

#[derive(Subcommand)]
enum RelayAction {
    Name { name: String },
    Description { description: String },
    Icon { url: String },
}

/// Execute the selected CLI subcommand, writing results to `out`.
async fn run(cli: Cli, out: &mut dyn Write) -> anyhow::Result<()> {
    ensure_env_file(&cli.env)?;
    let cfg = Settings::from_env(&cli.env)?;
    let ctx = Session {
        relay: cli.relay.clone().or_else(|| cfg.relay_url.clone()),
        json: cli.json,
        cfg,
    };
    match cli.command {
        Commands::Init => {}
        Commands::Use { url } => {
            let url = validate::relay_url(&url)?;
            write_env_value(&cli.env, "RELAY_URL", &url)?;
            writeln!(out, "relay set to {url}")?;
        }
        Commands::Whoami => {
            let signer = ctx.cfg.signer()?.ok_or(error::Error::SignerNotFound)?;
            writeln!(out, "{}", signer.public_key().await?)?;
        }
        Commands::Info => {
            let info = info::fetch_info(&reqwest::Client::new(), ctx.relay()?).await?;
            ctx.print_info(out, &info)?;
        }
        Commands::Cors { origin } => {
            let report = info::probe_cors(&reqwest::Client::new(), ctx.relay()?, &origin).await?;
            if ctx.json {
                writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
            } else if report.allowed() {
                writeln!(out, "ok: {origin} may call the admin API")?;
            } else {
                for problem in report.problems() {
                    writeln!(out, "blocked: {problem}")?;
                }
            }
        }
        Commands::Events {
            kinds,
            authors,
            limit,
            since,
            follow,
        } => {
            let kinds = kinds
                .iter()
                .map(|k| validate::kind(k))
                .collect::<Result<Vec<_>, _>>()?;
            let authors = if authors.is_empty() { &ctx.cfg.feed_authors } else { &authors };
            let authors = authors
                .iter()
                .map(|a| validate::pubkey(a))
                .collect::<Result<Vec<_>, _>>()?;
            let filter = feed::Filter {
                kinds: if kinds.is_empty() { ctx.cfg.feed_kinds.clone() } else { kinds },
                authors,
                since,
                limit: Some(limit.unwrap_or(ctx.cfg.feed_limit)),
            };
            let opts = ctx.cfg.feed_options();
            if follow {
                let mut write_err = None;
                feed::follow(ctx.relay()?, &filter, &opts, |ev| match ctx.print_event(out, ev) {
                    Ok(()) => ControlFlow::Continue(()),
                    Err(e) => {
                        write_err = Some(e);
                        ControlFlow::Break(())
                    }
                })
                .await?;
                if let Some(e) = write_err {
                    return Err(e);
                }
            } else {
                for ev in feed::fetch(ctx.relay()?, &filter, &opts).await? {
                    ctx.print_event(out, &ev)?;
                }
            }
        }
        Commands::Methods => {
            let methods = ctx.admin()?.supported_methods().await?;
            ctx.print_list(out, &methods, |m| m.clone())?;
        }
        Commands::Call { method, params } => {
            let params = params.iter().map(|p| Some(parse_param(p))).collect();
            let result = ctx.admin()?.rpc().call(&method, params).await?;
            writeln!(out, "{}", serde_json::to_string_pretty(&result)?)?;
        }
        Commands::Pubkey { action } => handle_pubkey(&ctx, action, out).await?,
        Commands::Event { action } => handle_event(&ctx, action, out).await?,
        Commands::Kind { action } => handle_kind(&ctx, action, out).await?,
        Commands::Ip { action } => handle_ip(&ctx, action, out).await?,
        Commands::Relay { action } => handle_relay(&ctx, action, out).await?,
    }
    Ok(())
}

/// Settings resolved for one invocation.
struct Session {
    relay: Option<String>,
    json: bool,
    cfg: Settings,
}

impl Session {
    fn relay(&self) -> anyhow::Result<&str> {
        self.relay
            .as_deref()
            .ok_or_else(|| anyhow!("no relay configured: pass --relay or run `relaydeck use <url>`"))
    }

    fn admin(&self) -> anyhow::Result<Admin> {
        let rpc = RpcClient::new(self.relay()?, self.cfg.signer()?)?;
        Ok(Admin::new(rpc))
    }

    /// Print rows as `key<TAB>reason`, or as a JSON array.
    fn print_list<T: Serialize>(
        &self,
        out: &mut dyn Write,
        rows: &[T],
        line: impl Fn(&T) -> String,
    ) -> anyhow::Result<()> {
        if self.json {
            writeln!(out, "{}", serde_json::to_string_pretty(rows)?)?;
        } else {
            for row in rows {
                writeln!(out, "{}", line(row))?;
            }
        }
        Ok(())
    }

    fn print_event(&self, out: &mut dyn Write, ev: &Event) -> anyhow::Result<()> {
        if self.json {
            writeln!(out, "{}", serde_json::to_string(ev)?)?;
        } else {
            writeln!(out, "{}", event_line(ev))?;
        }
        Ok(())
    }

    fn print_info(&self, out: &mut dyn Write, info: &info::RelayInfo) -> anyhow::Result<()> {
        if self.json {
            writeln!(out, "{}", serde_json::to_string_pretty(info)?)?;
            return Ok(());
        }
        let field = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".into());
        writeln!(out, "name:        {}", field(&info.name))?;
        writeln!(out, "description: {}", field(&info.description))?;
        writeln!(out, "pubkey:      {}", field(&info.pubkey))?;
        writeln!(out, "contact:     {}", field(&info.contact))?;
        writeln!(out, "software:    {} {}", field(&info.software), field(&info.version))?;
        let nips: Vec<String> = info.supported_nips.iter().map(u32::to_string).collect();
        writeln!(out, "nips:        {}", nips.join(", "))?;
        if let Some(lim) = &info.limitation {
            writeln!(out, "limitation:  {}", serde_json::to_string(lim)?)?;
        }
        if let Some(fees) = &info.fees {
            writeln!(out, "fees:        {}", serde_json::to_string(fees)?)?;
        }
        if !info.retention.is_empty() {
            writeln!(out, "retention:   {}", serde_json::to_string(&info.retention)?)?;
        }
        Ok(())
    }
}

async fn handle_pubkey(ctx: &Session, action: PubkeyAction, out: &mut dyn Write) -> anyhow::Result<()> {
    let row = |e: &admin::PubkeyEntry| reason_row(&e.pubkey, e.reason.as_deref());
    match action {
        PubkeyAction::Ban { pubkey, reason } => {
            let pubkey = validate::pubkey(&pubkey)?;
            ctx.admin()?.ban_pubkey(&pubkey, reason.as_deref()).await?;
            writeln!(out, "banned {pubkey}")?;
        }
        PubkeyAction::Unban { pubkey, reason } => {
            let pubkey = validate::pubkey(&pubkey)?;
            ctx.admin()?.unban_pubkey(&pubkey, reason.as_deref()).await?;
            writeln!(out, "unbanned {pubkey}")?;
        }
        PubkeyAction::Allow { pubkey, reason } => {
            let pubkey = validate::pubkey(&pubkey)?;
            ctx.admin()?.allow_pubkey(&pubkey, reason.as_deref()).await?;
            writeln!(out, "allowed {pubkey}")?;
        }
        PubkeyAction::Unallow { pubkey, reason } => {
            let pubkey = validate::pubkey(&pubkey)?;
            ctx.admin()?.unallow_pubkey(&pubkey, reason.as_deref()).await?;
            writeln!(out, "unallowed {pubkey}")?;
        }
        PubkeyAction::Banned => {
            let rows = ctx.admin()?.list_banned_pubkeys().await?;
            ctx.print_list(out, &rows, row)?;
        }
        PubkeyAction::Allowed => {
            let rows = ctx.admin()?.list_allowed_pubkeys().await?;
            ctx.print_list(out, &rows, row)?;
        }
    }
    Ok(())
}

async fn handle_event(ctx: &Session, action: EventAction, out: &mut dyn Write) -> anyhow::Result<()> {
    let row = |e: &admin::EventEntry| reason_row(&e.id, e.reason.as_deref());
    match action {
        EventAction::Ban { id, reason } => {
            let id = validate::event_id(&id)?;
            ctx.admin()?.ban_event(&id, reason.as_deref()).await?;
            writeln!(out, "banned {id}")?;
        }
        EventAction::Allow { id, reason } => {
            let id = validate::event_id(&id)?;
            ctx.admin()?.allow_event(&id, reason.as_deref()).await?;
            writeln!(out, "allowed {id}")?;
        }
        EventAction::Banned => {
            let rows = ctx.admin()?.list_banned_events().await?;
            ctx.print_list(out, &rows, row)?;
        }
        EventAction::Pending => {
            let rows = ctx.admin()?.list_events_needing_moderation().await?;
            ctx.print_list(out, &rows, row)?;
        }
    }
    Ok(())
}

async fn handle_kind(ctx: &Session, action: KindAction, out: &mut dyn Write) -> anyhow::Result<()> {
    match action {
        KindAction::Allow { kind } => {
            let kind = validate::kind(&kind)?;
            ctx.admin()?.allow_kind(kind).await?;
            writeln!(out, "allowed kind {kind}")?;
        }
        KindAction::Disallow { kind } => {
            let kind = validate::kind(&kind)?;
            ctx.admin()?.disallow_kind(kind).await?;
            writeln!(out, "disallowed kind {kind}")?;
        }
        KindAction::List => {
            let mut kinds = ctx.admin()?.list_allowed_kinds().await?;
            kinds.sort_unstable();
            ctx.print_list(out, &kinds, u32::to_string)?;
        }
    }
    Ok(())
}

async fn handle_ip(ctx: &Session, action: IpAction, out: &mut dyn Write) -> anyhow::Result<()> {
    match action {
        IpAction::Block { ip, reason } => {
            let ip = validate::ip(&ip)?;
            ctx.admin()?.block_ip(&ip, reason.as_deref()).await?;
            writeln!(out, "blocked {ip}")?;
        }
        IpAction::Unblock { ip } => {
            let ip = validate::ip(&ip)?;
            ctx.admin()?.unblock_ip(&ip).await?;
            writeln!(out, "unblocked {ip}")?;
        }
        IpAction::List => {
            let rows = ctx.admin()?.list_blocked_ips().await?;
            ctx.print_list(out, &rows, |e| reason_row(&e.ip, e.reason.as_deref()))?;
        }
    }
    Ok(())
}

async fn handle_relay(ctx: &Session, action: RelayAction, out: &mut dyn Write) -> anyhow::Result<()> {
    let admin = ctx.admin()?;
    match action {
        RelayAction::Name { name } => admin.change_relay_name(&name).await?,
        RelayAction::Description { description } => {
            admin.change_relay_description(&description).await?
        }
        RelayAction::Icon { url } => {
            let url = url::Url::parse(url.trim()).context("icon must be a URL")?;
            admin.change_relay_icon(url.as_str()).await?
        }
    }
    writeln!(out, "relay updated")?;
    Ok(())
}

fn reason_row(key: &str, reason: Option<&str>) -> String {
    match reason {
        Some(r) if !r.is_empty() => format!("{key}\t{r}"),
        _ => key.to_string(),
    }
}

/// One-line summary: time, kind, short author, first line of content.
fn event_line(ev: &Event) -> String {
    let when = i64::try_from(ev.created_at)
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ev.created_at.to_string());
    let author: String = ev.pubkey.chars().take(8).collect();
    let mut content: String = ev.content.lines().next().unwrap_or_default().chars().take(80).collect();
    if content.len() < ev.content.trim_end().len() {
        content.push('…');
    }
    format!("{when}  {:>5}  {author}  {content}", ev.kind)
}

/// Raw `call` params: JSON when it parses (`42`, `true`, `null`, `"x"`), else a plain string.
fn parse_param(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Create a default `.env` file if one is not already present at `path`.
fn ensure_env_file(path: &str) -> anyhow::Result<()> {
    let env_path = Path::new(path);
    if env_path.exists() {
        return Ok(());
    }
    if let Some(parent) = env_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut content = String::new();
    content.push_str("RELAY_URL=\n");
    content.push_str("SECRET_KEY=\n");
    content.push_str("TOR_SOCKS=\n");
    content.push_str("FEED_KINDS=1\n");
    content.push_str("FEED_AUTHORS=\n");
    content.push_str(&format!("FEED_LIMIT={}\n", config::DEFAULT_FEED_LIMIT));
    content.push_str("VERIFY_SIG=0\n");
    fs::write(env_path, content)?;
    Ok(())
}

/// Replace (or append) `key=value` in the env file and the process environment.
fn write_env_value(env_path: &str, key: &str, value: &str) -> anyhow::Result<()> {
    let content = fs::read_to_string(env_path)?;
    let prefix = format!("{key}=");
    let mut new_content = String::new();
    let mut replaced = false;
    for line in content.lines() {
        if line.starts_with(&prefix) {
            new_content.push_str(&format!("{key}={value}\n"));
            replaced = true;
        } else {
            new_content.push_str(line);
            new_content.push('\n');
        }
    }
    if !replaced {
        new_content.push_str(&format!("{key}={value}\n"));
    }
    fs::write(env_path, new_content)?;
    std::env::set_var(key, value);
    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;
    let filter = if verbose {
        EnvFilter::new("relaydeck=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

const CANCELLED: &str = "cancelled; a management call already sent may still be applied by the relay";

/// Run `cli` unless `cancel` resolves first. Nothing is retried or rolled back.
async fn run_until(
    cli: Cli,
    out: &mut dyn Write,
    cancel: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    tokio::select! {
        res = run(cli, out) => res,
        _ = cancel => Err(anyhow!(CANCELLED)),
    }
}

#[cfg(not(test))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let ctrl_c = async {
        // Without a signal handler there is nothing to wait for.
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    run_until(cli, &mut out, ctrl_c).await
}
