pub mod auth;
pub mod clock;
pub mod dirs;
pub mod error;
pub mod handlers;
pub mod ids;
pub mod lifecycle;
pub mod server;
pub mod store;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub pastes: lifecycle::Pastes,
    /// Optional bearer key guarding operator endpoints.
    pub api_key: Option<String>,
}

pub use error::PasteError;
pub use lifecycle::{Created, NewPaste, PasteBody, Pastes};
pub use server::{open_store, resolve_data_dir, router, run, ServerConfig, StorageBackend};
