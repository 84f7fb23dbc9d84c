use sea_orm::{Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;

use crate::config::PrattleConfig;
use crate::error::MigrationError;

pub mod migrator;

pub async fn open_or_create_db(config: &PrattleConfig) -> Result<DatabaseConnection, DbErr> {
    // Use display() to convert PathBuf to string representation
    let connection_string = format!("sqlite://{}?mode=rwc", config.database_path.display());

    Database::connect(&connection_string).await
}

pub async fn migrate_up(db: &DatabaseConnection) -> Result<(), MigrationError> {
    migrator::Migrator::up(db, None).await?;
    Ok(())
}
