mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use inkpost_api::auth::AuthConfig;
use inkpost_api::cache::BlogListCache;
use inkpost_api::media::MediaStorage;
use inkpost_api::{AppState, AppStateInner, routes};
use inkpost_db::Database;

use crate::config::Config;

const USAGE: &str = "usage: inkpost [serve | promote <username>]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "inkpost=debug,inkpost_api=debug,inkpost_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {}.", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        [] | ["serve"] => serve(config).await,
        ["promote", username] => promote(&config, username),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let db = Database::open(&config.db_path)?;
    let media = MediaStorage::new(config.media_dir.clone()).await?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        auth: AuthConfig {
            jwt_secret: config.jwt_secret.clone(),
            access_ttl: config.access_token_ttl,
            refresh_ttl: config.refresh_token_ttl,
        },
        cache: BlogListCache::new(config.cache_ttl),
        media,
    });

    let app = routes::app(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Inkpost server listening on {}", addr);
    info!("Listing cache TTL: {}s", config.cache_ttl.as_secs());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Grants superuser rights, which allow deleting any blog or comment.
fn promote(config: &Config, username: &str) -> anyhow::Result<()> {
    let db = Database::open(&config.db_path)?;
    if !db.set_superuser(username, true)? {
        anyhow::bail!("no user named {:?}", username);
    }
    info!("{} is now a superuser", username);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    info!("Received Ctrl+C, shutting down...");
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
