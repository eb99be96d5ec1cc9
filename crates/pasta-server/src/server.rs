use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    auth::require_operator_key,
    handlers::{create_paste, get_paste, health, prune_pastes, resolve_short_id},
    lifecycle::Pastes,
    store::{MemoryStore, RecordStore, Store},
    AppState,
};

/// Where pastes are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    /// `pasta.db` in the data directory.
    #[default]
    Redb,
    /// Process memory; everything is lost on restart.
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "redb" | "disk" => Ok(Self::Redb),
            "memory" | "mem" => Ok(Self::Memory),
            other => anyhow::bail!("unknown storage backend {other:?} (expected redb or memory)"),
        }
    }
}

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub api_key: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub storage: StorageBackend,
    pub sweep_interval: Duration,
    pub cors_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("PASTA_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("PASTA_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            api_key: std::env::var("PASTA_API_KEY").ok(),
            data_dir: std::env::var("PASTA_DATA_DIR").ok().map(PathBuf::from),
            storage: std::env::var("PASTA_STORAGE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            sweep_interval: Duration::from_secs(300),
            cors_origins: std::env::var("PASTA_CORS_ORIGINS").ok(),
        }
    }
}

/// Resolve (and create) the data directory: the configured one, else the platform default.
pub fn resolve_data_dir(data_dir: Option<&PathBuf>) -> Result<PathBuf> {
    match data_dir {
        Some(d) => {
            std::fs::create_dir_all(d).context("create data dir")?;
            Ok(d.clone())
        }
        None => crate::dirs::platform_data_dir(),
    }
}

/// Open the configured record store.
pub fn open_store(
    storage: StorageBackend,
    data_dir: Option<&PathBuf>,
) -> Result<Arc<dyn RecordStore>> {
    match storage {
        StorageBackend::Memory => {
            info!("using in-memory storage; pastes will not survive a restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Redb => {
            let data_dir = resolve_data_dir(data_dir)?;
            info!(data_dir = %data_dir.display(), "using data directory");
            let store = Store::open(&data_dir.join("pasta.db")).context("open store")?;
            Ok(Arc::new(store))
        }
    }
}

/// Build the HTTP router. Split out from `run` so tests can drive it in-process.
pub fn router(state: AppState, cors_origins: Option<&str>) -> Router {
    let cors = build_cors(cors_origins);

    // Anonymous paste API.
    let public = Router::new()
        .route("/health", get(health))
        .route("/api/paste", post(create_paste))
        .route("/api/paste/{id}", get(get_paste))
        .route("/api/paste/short/{short_id}", get(resolve_short_id));

    // Operator routes (API key required if configured).
    let admin = Router::new()
        .route("/admin/prune", post(prune_pastes))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_operator_key,
        ));

    Router::new()
        .merge(public)
        .merge(admin)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let store = open_store(cfg.storage, cfg.data_dir.as_ref())?;
    let pastes = Pastes::new(store);

    // Expiry is enforced on read; the sweep only bounds storage growth.
    pastes.clone().spawn_sweep(cfg.sweep_interval);

    let state = AppState {
        pastes,
        api_key: cfg.api_key,
    };
    let app = router(state, cfg.cors_origins.as_deref());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "pasta server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, app).await.context("server error")
}

fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
        .allow_headers(Any);

    match origins {
        Some(o) => {
            let origins: Vec<_> = o
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            cors.allow_origin(origins)
        }
        None => cors.allow_origin(Any),
    }
}
