//! News aggregator binary entrypoint.
//! Boots the Axum HTTP server with the feed service, the background refresh
//! timer and the Prometheus endpoint.

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wellness_news::metrics::Metrics;
use wellness_news::scheduler::spawn_background_refresh;
use wellness_news::{build_state, router, AppConfig};

/// Compact logs by default; `NEWS_LOG_JSON=1` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("wellness_news=info,warn"));

    let json = std::env::var("NEWS_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    // Shuttle may already have installed a subscriber.
    if let Err(e) = res {
        eprintln!("tracing already initialised: {e}");
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let cfg = AppConfig::load()?;
    let state = build_state(&cfg)?;

    spawn_background_refresh(state.service.clone(), cfg.background_interval());

    let mut app = router(state);
    match Metrics::init(&cfg) {
        Ok(m) => app = app.merge(m.router()),
        Err(e) => tracing::warn!("metrics disabled: {e:#}"),
    }

    Ok(app.into())
}
