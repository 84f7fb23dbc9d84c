use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

static DATA_DIR_NAME: &str = "prattle";
static PRATTLE_DB_NAME: &str = "prattle_db.sqlite";
static CONFIG_FILE_NAME: &str = "config.json";

// For now this directory structure should be like
// data_dir_path
// |- prattle
//    |- prattle_db.sqlite
//    |- config.json

#[derive(Serialize, Deserialize, Debug)]
pub struct PrattleConfig {
    pub(crate) database_path: PathBuf,
}

impl PrattleConfig {
    /// Creates a new PrattleConfig pointing at the specified data directory
    fn new(data_dir: PathBuf) -> Self {
        let database_path = data_dir.join(PRATTLE_DB_NAME);

        PrattleConfig { database_path }
    }
}

/// Gets the existing config or initializes a new one if it doesn't exist
pub async fn get_or_init() -> Result<PrattleConfig, Box<dyn std::error::Error>> {
    let data_dir = dirs::data_dir().ok_or("failed to find a data directory on this platform")?;

    let prattle_dir = data_dir.join(DATA_DIR_NAME);
    let config_path = prattle_dir.join(CONFIG_FILE_NAME);

    // Create the prattle directory if it doesn't exist
    fs::create_dir_all(&prattle_dir).await?;

    // Check if config file exists
    if config_path.exists() {
        // Read and deserialize existing config
        let mut file = fs::File::open(&config_path).await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;

        let config: PrattleConfig = serde_json::from_str(&contents)?;
        Ok(config)
    } else {
        // Create new config
        let config = PrattleConfig::new(prattle_dir.clone());

        // Serialize and write to file
        let json = serde_json::to_string_pretty(&config)?;
        let mut file = fs::File::create(&config_path).await?;
        file.write_all(json.as_bytes()).await?;

        Ok(config)
    }
}
