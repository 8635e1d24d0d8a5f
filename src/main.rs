use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use paynl_bridge::api::{self, AppState};
use paynl_bridge::config::Config;
use paynl_bridge::database::{init_pool, PoolConfig, TransactionRecordRepository};
use paynl_bridge::host::{HostClient, HostConfig};
use paynl_bridge::payments::providers::{PaynlConfig, PaynlProvider};
use paynl_bridge::payments::{
    CallbackService, CallbackSigner, CredentialsSource, PaymentInitiator, ReconciliationEngine,
};
use paynl_bridge::workers::SweepWorker;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[cfg(feature = "cache")]
async fn credentials_source(
    config: &Config,
    host: Arc<HostClient>,
) -> (Arc<dyn CredentialsSource>, Option<paynl_bridge::cache::RedisPool>) {
    use paynl_bridge::cache::{init_cache_pool, CacheConfig, CachedCredentialsSource, RedisCache};

    let Some(redis_url) = config.redis.url.clone() else {
        tracing::info!("REDIS_URL not set; credential caching disabled");
        return (host as Arc<dyn CredentialsSource>, None);
    };

    let cache_config = CacheConfig {
        redis_url,
        ..Default::default()
    };

    match init_cache_pool(cache_config).await {
        Ok(pool) => {
            let source = CachedCredentialsSource::new(
                host,
                Arc::new(RedisCache::new(pool.clone())),
                Duration::from_secs(config.redis.credentials_ttl_secs),
            );
            (Arc::new(source), Some(pool))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable; credential caching disabled");
            (host as Arc<dyn CredentialsSource>, None)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env().context("invalid configuration")?;

    tracing::info!(
        environment = %config.server.environment,
        gateway = %config.gateway.name,
        "Starting PAY. payment bridge"
    );

    let db_pool = init_pool(
        &config.database.url,
        Some(PoolConfig {
            max_connections: config.database.max_connections,
            ..Default::default()
        }),
    )
    .await
    .context("failed to connect to the database")?;

    let store = Arc::new(TransactionRecordRepository::new(db_pool.clone()));

    let gateway = Arc::new(
        PaynlProvider::new(PaynlConfig {
            base_url: config.gateway.api_url.clone(),
            timeout_secs: config.gateway.timeout_secs,
        })
        .context("failed to build PAY. client")?,
    );

    let host = Arc::new(
        HostClient::new(HostConfig {
            base_url: config.host.api_url.clone(),
            api_token: config.host.api_token.clone(),
            gateway_name: config.gateway.name.clone(),
            timeout_secs: config.host.timeout_secs,
        })
        .context("failed to build host API client")?,
    );

    #[cfg(feature = "cache")]
    let (credentials, redis_pool) = credentials_source(&config, host.clone()).await;
    #[cfg(not(feature = "cache"))]
    let credentials: Arc<dyn CredentialsSource> = host.clone();

    let engine = Arc::new(ReconciliationEngine::new(
        store,
        gateway,
        credentials,
        host.clone(),
        host,
        config.engine_config(),
    ));

    let signer = CallbackSigner::new(&config.callbacks.signing_secret);

    let state = AppState {
        initiator: Arc::new(PaymentInitiator::new(
            engine.clone(),
            signer.clone(),
            config.callbacks.public_base_url.clone(),
        )),
        callbacks: Arc::new(CallbackService::new(
            engine.clone(),
            signer,
            config.host.site_url.clone(),
        )),
        environment: config.server.environment.clone(),
        db_pool: Some(db_pool),
        #[cfg(feature = "cache")]
        redis_pool,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep = tokio::spawn(SweepWorker::new(engine, config.sweep.clone()).run(shutdown_rx));

    let app = api::router(state);

    let host_addr: std::net::IpAddr = config
        .server
        .host
        .parse()
        .context("HOST must be an IP address")?;
    let addr = SocketAddr::new(host_addr, config.server.port);
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweep.await {
        tracing::error!(error = %e, "Sweep worker terminated abnormally");
    }

    Ok(())
}
