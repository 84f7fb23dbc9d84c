use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to apply schema migrations")]
    Db(#[from] sea_orm::DbErr),
}
