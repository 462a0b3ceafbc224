use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Parser;
use codeassist_relay::{
    FixedWindowLimiter, MemorySessionStore, RateLimiter, RelayConfig, Session, Unlimited,
    init_observability,
};

mod state;
mod web;

const SESSION_PRUNE_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Parser, Debug)]
#[command(name = "codeassist-server")]
#[command(about = "Streams AI code commands from LLM providers as server-sent events", long_about = None)]
struct Cli {
    /// Address to bind
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3001)]
    port: u16,

    /// Seed a session with this token for local development
    #[arg(long, env = "RELAY_DEV_SESSION_TOKEN")]
    dev_session_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_observability();
    let cli = Cli::parse();

    let config = RelayConfig::from_env().context("reading relay configuration")?;
    let relay = config.build_relay().context("building relay")?;
    if relay.registry().is_empty() {
        tracing::warn!("no AI provider configured; set GEMINI_API_KEY or GITHUB_TOKEN");
    }

    let sessions = Arc::new(MemorySessionStore::new());
    if let Some(token) = cli.dev_session_token.as_deref().filter(|t| !t.trim().is_empty()) {
        tracing::warn!("seeding development session");
        sessions.insert(
            token.trim(),
            Session::new("dev", "", chrono::Utc::now() + chrono::Duration::days(365)),
        );
    }

    let store = sessions.clone();
    spawn_pruner(SESSION_PRUNE_INTERVAL, move || store.prune(chrono::Utc::now()));

    let quota: Arc<dyn RateLimiter> = if config.quota.is_disabled() {
        Arc::new(Unlimited)
    } else {
        let limiter = Arc::new(FixedWindowLimiter::new(config.quota));
        let windows = limiter.clone();
        spawn_pruner(config.quota.window, move || windows.prune());
        limiter
    };

    let state = state::AppState::new(relay, sessions, quota);
    web::start_server(state, SocketAddr::new(cli.host, cli.port)).await
}

/// Runs `prune` every `every` for the life of the process.
fn spawn_pruner(every: Duration, prune: impl Fn() + Send + 'static) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            prune();
        }
    });
}
