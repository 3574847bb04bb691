use anyhow::{Context, Result};
use axum::Router;
use media_functions::{
    config::AppConfig,
    context::AppContext,
    db, routes,
    services::{
        document_store::SqliteDocumentStore, messenger::HttpMessenger,
        storage_service::DiskObjectStore,
    },
};
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting media-functions with config: {:?}", cfg);

    // --- Ensure storage and scratch directories exist ---
    for dir in [Path::new(&cfg.storage_dir), cfg.scratch_dir.as_path()] {
        if !dir.exists() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            tracing::info!("Created directory at {}", dir.display());
        }
    }

    // --- Initialize SQLite connection ---
    let db = Arc::new(db::connect(&cfg.database_url).await?);

    // --- Apply schema; exit afterwards in migration mode ---
    db::run_migrations(&db).await?;
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    // --- Initialize collaborators ---
    let store = DiskObjectStore::new(db.clone(), cfg.storage_dir.clone());
    store
        .ensure_bucket(&cfg.bucket, &cfg.region)
        .await
        .with_context(|| format!("preparing bucket {}", cfg.bucket))?;
    let documents = SqliteDocumentStore::new(db.clone());
    let messenger = HttpMessenger::new(cfg.messaging_endpoint.clone(), cfg.messaging_api_key.clone())?;

    let ctx = AppContext::new(
        Arc::new(store),
        Arc::new(documents),
        Arc::new(messenger),
        cfg.clone(),
    );

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(ctx);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!(
        "Server listening on http://{} (region {})",
        listener.local_addr()?,
        cfg.region
    );
    axum::serve(listener, app).await?;

    Ok(())
}
