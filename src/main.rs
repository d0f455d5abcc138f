mod aggregator;
mod cache;
mod config;
mod http;
mod models;
mod relay;
mod session;
mod upstream;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::aggregator::Aggregator;
use crate::cache::SnapshotCache;
use crate::http::AppState;
use crate::relay::PushRelay;
use crate::session::{Identity, SessionStore};
use crate::upstream::{MetricsClient, UpstreamClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!(
        r#"
  __  __           _     _                         _
 |  \/  | ___  ___| |__ | |__   ___   __ _ _ __ __| |
 | |\/| |/ _ \/ __| '_ \| '_ \ / _ \ / _` | '__/ _` |
 | |  | |  __/\__ \ | | | |_) | (_) | (_| | | | (_| |
 |_|  |_|\___||___/_| |_|_.__/ \___/ \__,_|_|  \__,_|

 Admin console for your mesh control server
"#
    );

    tracing_subscriber::fmt::init();

    let config = config::load().await?;

    if config.headscale.api_key.is_empty() {
        eprintln!("WARNING: headscale.api_key is empty - control API calls will be rejected");
    }

    let identity = Arc::new(Identity::new(
        &config.admin.username,
        &config.admin.password_hash,
    ));
    if !identity.has_credential() {
        eprintln!("WARNING: admin.password_hash is not set - all logins will be rejected");
    }

    let upstream = Arc::new(UpstreamClient::new(
        &config.headscale.url,
        &config.headscale.api_key,
    )?);
    let metrics = Arc::new(MetricsClient::new(config.prometheus.url.as_deref())?);
    let aggregator = Arc::new(Aggregator::new(upstream, metrics));
    let cache = Arc::new(SnapshotCache::new());
    let relay = PushRelay::new();
    let sessions = Arc::new(SessionStore::new());

    relay::spawn_stats_loop(
        relay.clone(),
        aggregator.clone(),
        cache.clone(),
        config.updates.stats_interval_secs,
    );
    if config.updates.demo_activity {
        relay::spawn_demo_activity(relay.clone(), config.updates.activity_interval_secs);
    }

    let state = AppState {
        aggregator,
        cache,
        relay,
        sessions,
        identity,
    };
    let app = http::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    println!("Meshboard listening on http://{addr}");
    println!("Control API: {}", config.headscale.url);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
