//! Process entry point: loads settings, stands up the `Core` (DB pool,
//! Lightning client, used-hash set, price cache, macaroon root key), runs
//! pending migrations, spawns the used-hash cleanup task, and serves the
//! HTTP surface until shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use diesel::r2d2;
use diesel::r2d2::ConnectionManager;
use diesel::PgConnection;
use gateway::cli::Opts;
use gateway::logger;
use gateway::price_cache::BtcPriceCache;
use gateway::routes::router;
use gateway::run_migration;
use gateway::settings::Settings;
use gateway::state::Core;
use gateway::state::DailyCounters;
use gateway::used_hash::UsedHashSet;
use lightning_client::PhoenixClient;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::metadata::LevelFilter;

/// Connection-pool sizing: at most 5 connections, at least 1 kept warm.
const DB_POOL_MAX_SIZE: u32 = 5;
const DB_POOL_MIN_IDLE: u32 = 1;

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::read();
    logger::init_tracing(LevelFilter::INFO, opts.json)?;

    let data_dir = opts.data_dir()?;
    std::fs::create_dir_all(&data_dir).context("could not create data dir")?;
    let settings = Arc::new(Settings::new(&data_dir).await);

    let manager = ConnectionManager::<PgConnection>::new(opts.database.clone());
    let pool = r2d2::Pool::builder()
        .max_size(DB_POOL_MAX_SIZE)
        .min_idle(Some(DB_POOL_MIN_IDLE))
        .build(manager)
        .context("failed to build database pool")?;

    {
        let mut conn = pool.get().context("failed to acquire a connection to run migrations")?;
        run_migration(&mut conn);
    }

    let phoenix = PhoenixClient::new(opts.phoenix_url.clone(), opts.phoenix_password.clone());

    let root_key = resolve_root_key(opts.l402_root_key.as_deref())?;

    let used_hashes =
        Arc::new(UsedHashSet::new(settings.used_hash_ttl_seconds, settings.used_hash_cleanup_interval_seconds));
    let price_cache = Arc::new(BtcPriceCache::new(settings.btc_price.source.clone(), settings.btc_price.cache_seconds));

    let core = Core {
        pool,
        phoenix,
        used_hashes: used_hashes.clone(),
        price_cache,
        settings,
        root_key: Arc::new(root_key),
        daily_counters: Arc::new(Mutex::new(DailyCounters::default())),
    };

    let cleanup_interval = Duration::from_secs(core.settings.used_hash_cleanup_interval_seconds);
    let cleanup_handle = tokio::spawn({
        let used_hashes = used_hashes.clone();
        async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            loop {
                ticker.tick().await;
                used_hashes.cleanup();
            }
        }
    });

    let app = router(core);

    let addr = opts.http_address;
    tracing::info!(%addr, "gateway listening");

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Cancel and await the cleanup task before the process exits. The db
    // pool and the phoenix client's http client are dropped with
    // `core`/`app`, which releases their resources.
    cleanup_handle.abort();
    let _ = cleanup_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

/// Reads the 32-byte hex root key from config; if absent, generates an
/// ephemeral one and warns.
fn resolve_root_key(configured: Option<&str>) -> Result<[u8; 32]> {
    match configured {
        Some(hex_key) => {
            let bytes = hex::decode(hex_key).context("L402_ROOT_KEY must be hex")?;
            let key: [u8; 32] = bytes.try_into().map_err(|_| anyhow::anyhow!("L402_ROOT_KEY must decode to exactly 32 bytes"))?;
            Ok(key)
        }
        None => {
            tracing::warn!("L402_ROOT_KEY not set, generating an ephemeral root key; macaroons will not verify across restarts");
            let mut key = [0u8; 32];
            OsRng.fill_bytes(&mut key);
            Ok(key)
        }
    }
}
