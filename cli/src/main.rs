use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use alertchat_core::{AppAction, AppReconciler, AppState, AppUpdate, ChatMessage, FfiApp};
use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use serde_json::json;

#[derive(Debug, Parser)]
#[command(name = "alertchat")]
#[command(about = "Group chat client for watching and posting to a group from the terminal")]
struct Cli {
    /// Data directory (config and logs persist here between runs)
    #[arg(long, default_value = ".alertchat")]
    data_dir: PathBuf,

    /// API base URL, e.g. https://alerts.example.com/api
    #[arg(long, env = "ALERTCHAT_API_URL")]
    api_url: Option<String>,

    /// Bearer token sent with every request
    #[arg(long, env = "ALERTCHAT_AUTH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Your user id, used to mark your own messages
    #[arg(long)]
    viewer: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print group messages as they arrive (runs until interrupted or --timeout)
    Watch {
        /// Group id
        #[arg(long)]
        group: String,

        /// Timeout in seconds (0 = run forever)
        #[arg(long, default_value_t = 0)]
        timeout: u64,
    },

    /// Send a message (text, media, or both) to a group
    Send {
        /// Group id
        #[arg(long)]
        group: String,

        /// Message text
        #[arg(long, default_value = "")]
        text: String,

        /// Image or video file to attach
        #[arg(long)]
        attach: Option<PathBuf>,
    },
}

struct ChannelReconciler {
    tx: flume::Sender<AppUpdate>,
}

impl AppReconciler for ChannelReconciler {
    fn reconcile(&self, update: AppUpdate) {
        let _ = self.tx.send(update);
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    std::fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("create data dir {}", cli.data_dir.display()))?;
    write_config_overrides(&cli)?;

    let (app, updates) = start(&cli)?;
    match &cli.cmd {
        Command::Watch { group, timeout } => cmd_watch(&app, &updates, group, *timeout),
        Command::Send {
            group,
            text,
            attach,
        } => cmd_send(&app, &updates, group, text, attach.as_deref()),
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Merge command-line settings into the config file the core reads on start.
fn write_config_overrides(cli: &Cli) -> anyhow::Result<()> {
    let path = cli.data_dir.join(alertchat_core::config_file_name());
    let mut config: serde_json::Value = match std::fs::read(&path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .with_context(|| format!("parse {}", path.display()))?,
        Err(_) => serde_json::from_str(&alertchat_core::default_config_json())
            .context("parse default config")?,
    };
    let obj = config
        .as_object_mut()
        .ok_or_else(|| anyhow!("{} must contain a JSON object", path.display()))?;

    if let Some(url) = &cli.api_url {
        obj.insert("api_base_url".into(), json!(url));
    }
    if let Some(token) = &cli.token {
        obj.insert("auth_token".into(), json!(token));
    }
    if let Some(viewer) = &cli.viewer {
        obj.insert("viewer_id".into(), json!(viewer));
    }

    std::fs::write(&path, serde_json::to_vec_pretty(&config)?)
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn start(cli: &Cli) -> anyhow::Result<(Arc<FfiApp>, flume::Receiver<AppUpdate>)> {
    let data_dir = cli
        .data_dir
        .to_str()
        .ok_or_else(|| anyhow!("data dir is not valid UTF-8"))?
        .to_string();
    let app = FfiApp::new(data_dir);
    let (tx, rx) = flume::unbounded();
    app.listen_for_updates(Box::new(ChannelReconciler { tx }));
    Ok((app, rx))
}

/// Block until `done` returns Some for the latest state, or fail after `timeout`.
fn wait_for<T>(
    updates: &flume::Receiver<AppUpdate>,
    timeout: Duration,
    what: &str,
    mut done: impl FnMut(&AppState) -> Option<T>,
) -> anyhow::Result<T> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            bail!("timed out waiting for {what}");
        }
        match updates.recv_timeout(remaining) {
            Ok(AppUpdate::FullState(state)) => {
                if let Some(out) = done(&state) {
                    return Ok(out);
                }
            }
            Ok(AppUpdate::ScrollToLatest { .. }) => {}
            Err(flume::RecvTimeoutError::Timeout) => bail!("timed out waiting for {what}"),
            Err(flume::RecvTimeoutError::Disconnected) => bail!("app core stopped"),
        }
    }
}

fn open_group(
    app: &FfiApp,
    updates: &flume::Receiver<AppUpdate>,
    group: &str,
) -> anyhow::Result<Vec<ChatMessage>> {
    app.dispatch(AppAction::OpenGroup {
        group_id: group.to_string(),
    });
    wait_for(updates, Duration::from_secs(30), "initial load", |s| {
        let g = s.current_group.as_ref()?;
        if g.group_id != group {
            return None;
        }
        if g.initial_load_complete {
            return Some(Ok(g.messages.clone()));
        }
        g.load_error.clone().map(Err)
    })?
    .map_err(|e| anyhow!(e))
}

fn message_json(m: &ChatMessage) -> serde_json::Value {
    json!({
        "id": m.id,
        "sender": m.sender_id,
        "sender_name": m.sender_name,
        "text": m.text,
        "media": m.media.as_ref().map(|media| json!({
            "url": media.url,
            "type": media.kind.as_str(),
        })),
        "created_at_ms": m.created_at_ms,
        "mine": m.is_mine,
        "pending": m.is_pending(),
    })
}

// ── Commands ────────────────────────────────────────────────────────────────

fn cmd_watch(
    app: &FfiApp,
    updates: &flume::Receiver<AppUpdate>,
    group: &str,
    timeout_secs: u64,
) -> anyhow::Result<()> {
    let initial = open_group(app, updates, group)?;
    let mut printed: HashSet<String> = HashSet::new();
    for m in &initial {
        println!("{}", message_json(m));
        printed.insert(m.id.clone());
    }

    let deadline = (timeout_secs > 0).then(|| Instant::now() + Duration::from_secs(timeout_secs));
    loop {
        let update = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match updates.recv_timeout(remaining) {
                    Ok(u) => u,
                    Err(flume::RecvTimeoutError::Timeout) => break,
                    Err(flume::RecvTimeoutError::Disconnected) => bail!("app core stopped"),
                }
            }
            None => updates.recv().map_err(|_| anyhow!("app core stopped"))?,
        };
        let state = match update {
            AppUpdate::FullState(state) => state,
            AppUpdate::ScrollToLatest { message_id, .. } => {
                eprintln!("-- new message {message_id}");
                continue;
            }
        };
        let Some(g) = state.current_group else {
            continue;
        };
        for m in g.messages.iter().filter(|m| !m.is_pending()) {
            if printed.insert(m.id.clone()) {
                println!("{}", message_json(m));
            }
        }
    }

    eprintln!("watch finished");
    Ok(())
}

fn cmd_send(
    app: &FfiApp,
    updates: &flume::Receiver<AppUpdate>,
    group: &str,
    text: &str,
    attach: Option<&Path>,
) -> anyhow::Result<()> {
    if text.trim().is_empty() && attach.is_none() {
        bail!("nothing to send: pass --text and/or --attach");
    }
    let before: HashSet<String> = open_group(app, updates, group)?
        .into_iter()
        .map(|m| m.id)
        .collect();

    if let Some(path) = attach {
        let path = path
            .to_str()
            .ok_or_else(|| anyhow!("attachment path is not valid UTF-8"))?;
        app.dispatch(AppAction::SelectAttachment {
            path: path.to_string(),
            mime_type: None,
        });
        wait_for(updates, Duration::from_secs(30), "attachment", |s| {
            if let Some(err) = &s.composer.attachment_error {
                return Some(Err(anyhow!("attachment rejected: {err}")));
            }
            s.composer.attachment.as_ref().map(|_| Ok(()))
        })??;
    }

    app.dispatch(AppAction::SendMessage {
        text: text.to_string(),
    });
    let sent = wait_for(updates, Duration::from_secs(120), "send", |s| {
        if s.busy.sending_message {
            return None;
        }
        if let Some(err) = &s.composer.send_error {
            return Some(Err(anyhow!("send failed: {err}")));
        }
        let g = s.current_group.as_ref()?;
        g.messages
            .iter()
            .rev()
            .find(|m| m.is_mine && !before.contains(&m.id))
            .map(|m| Ok(m.clone()))
    })??;

    println!("{}", message_json(&sent));
    Ok(())
}
