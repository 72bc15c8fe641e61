//! Shared runtime state for webhook-daemon.
//!
//! All handlers receive `State<Arc<AppState>>` from Axum; this module owns
//! nothing async itself beyond the pool and build metadata.

use sqlx::PgPool;

/// Static build metadata included in health responses.
#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub build: BuildInfo,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            build: BuildInfo {
                service: "webhook-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
        }
    }
}
