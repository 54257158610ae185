use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server_url: String,
    pub client_version: String,
    pub platform: String,
    pub os: String,

    /// Keep-alive period in seconds.
    pub heartbeat_secs: u64,
    /// Own-farm poll interval in seconds.
    pub farm_interval_secs: u64,
    /// Friend-farm poll interval in seconds.
    pub friend_interval_secs: u64,
    /// Task poll interval in seconds.
    pub task_interval_secs: u64,
    /// Warehouse sell interval in seconds.
    pub sell_interval_secs: u64,
    /// Deadline for one correlated call, in seconds.
    pub call_timeout_secs: u64,

    /// Plant the cheapest unlocked seed instead of the highest-tier one.
    pub prefer_lowest_tier: bool,
    /// Item applied to freshly planted lands.
    pub fertilizer_item_id: i64,
    /// Shop that carries seeds.
    pub seed_shop_id: i64,

    /// Path to the static plant catalog (JSON). Optional.
    pub catalog_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "wss://gate.example.com/prod/ws".into(),
            client_version: "1.6.0".into(),
            platform: "qq".into(),
            os: "iOS".into(),
            heartbeat_secs: 25,
            farm_interval_secs: 30,
            friend_interval_secs: 60,
            task_interval_secs: 300,
            sell_interval_secs: 60,
            call_timeout_secs: 10,
            prefer_lowest_tier: false,
            fertilizer_item_id: 1012,
            seed_shop_id: 2,
            catalog_path: PathBuf::from("catalog/plants.json"),
        }
    }
}

impl Config {
    /// Load from a TOML file; an absent file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn farm_interval(&self) -> Duration {
        Duration::from_secs(self.farm_interval_secs.max(10))
    }

    pub fn friend_interval(&self) -> Duration {
        Duration::from_secs(self.friend_interval_secs.max(60))
    }

    pub fn task_interval(&self) -> Duration {
        Duration::from_secs(self.task_interval_secs.max(60))
    }

    pub fn sell_interval(&self) -> Duration {
        Duration::from_secs(self.sell_interval_secs.max(60))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = Config::load(Path::new("/nonexistent/furrow.toml")).unwrap();
        assert_eq!(config.heartbeat_secs, 25);
        assert_eq!(config.seed_shop_id, 2);
        assert!(!config.prefer_lowest_tier);
    }

    #[test]
    fn test_partial_file_keeps_defaults_for_rest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "farm_interval_secs = 45\nprefer_lowest_tier = true").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.farm_interval_secs, 45);
        assert!(config.prefer_lowest_tier);
        assert_eq!(config.friend_interval_secs, 60);
    }

    #[test]
    fn test_interval_floors() {
        let config = Config {
            farm_interval_secs: 1,
            friend_interval_secs: 5,
            call_timeout_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.farm_interval(), Duration::from_secs(10));
        assert_eq!(config.friend_interval(), Duration::from_secs(60));
        assert_eq!(config.call_timeout(), Duration::from_secs(1));
    }
}
