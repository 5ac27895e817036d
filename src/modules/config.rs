use std::fs;
use std::path::{Path, PathBuf};

use crate::proxy::GatewayConfig;

const DATA_DIR: &str = ".workforce-gateway";
const CONFIG_FILE: &str = "gateway.json";
const CONFIG_PATH_ENV: &str = "WORKFORCE_GATEWAY_CONFIG";

/// Get data directory path (`~/.workforce-gateway`)
pub fn get_data_dir() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Failed to get user home directory")?;
    Ok(home.join(DATA_DIR))
}

/// Config file location: explicit env path first, then the data dir
fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    let path = get_data_dir().ok()?.join(CONFIG_FILE);
    path.exists().then_some(path)
}

/// Load gateway configuration from a JSON file
pub fn load_config_file(path: &Path) -> Result<GatewayConfig, String> {
    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read config file {:?}: {}", path, e))?;

    serde_json::from_str(&content).map_err(|e| format!("Failed to parse config file {:?}: {}", path, e))
}

/// Load configuration: file (if any), then environment overrides, then validation
pub fn load_gateway_config() -> Result<GatewayConfig, String> {
    let mut config = match config_path() {
        Some(path) => load_config_file(&path)?,
        None => {
            tracing::debug!("no config file found, using defaults");
            GatewayConfig::default()
        }
    };

    config.apply_env(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}
