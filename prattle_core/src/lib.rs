pub mod entity;
pub mod ids;
pub mod models;
use tokio::sync::OnceCell;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::service::comments::CommentsService;

pub mod service;

pub mod error;

pub mod config;

static PRATTLE_CORE: OnceCell<Arc<PrattleCore>> = OnceCell::const_new();

pub async fn core() -> Arc<PrattleCore> {
    PRATTLE_CORE
        .get_or_init(|| async move { Arc::new(PrattleCore::start().await.expect("failed to init")) })
        .await
        .clone()
}

/// Main runtime handle for Prattle.
pub struct PrattleCore {
    pub config: config::PrattleConfig,

    /// Shared database handle backing the services.
    pub db: DatabaseConnection,

    /// Thread operations: create, list, cascade delete.
    pub comments: CommentsService,
}

impl PrattleCore {
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        tracing_subscriber::fmt::try_init().ok();

        let config = config::get_or_init().await?;
        tracing::debug!(?config, "loaded config");

        // DB + migrations
        let db = models::open_or_create_db(&config).await?;
        models::migrate_up(&db).await?;

        let comments = CommentsService::new(db.clone());

        Ok(Self {
            config,
            db,
            comments,
        })
    }

    pub async fn shutdown(self) -> Result<(), Box<dyn std::error::Error>> {
        self.db.close().await?;
        Ok(())
    }
}

pub mod prelude {
    pub use super::entity;
    pub use super::ids;
    pub use super::models;

    pub use super::service;

    pub use super::error;

    pub use super::config;
}
