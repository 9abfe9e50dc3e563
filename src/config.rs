//! Server configuration: the TOML schema, its defaults, and the packet
//! opcode table.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

/// The TOML server configuration. Field names match the configuration file
/// keys.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "MaxPlayers")]
    pub max_players: usize,
    #[serde(rename = "DataDir")]
    pub data_dir: PathBuf,
    #[serde(rename = "PacketHandlerFile")]
    pub packet_handler_file: PathBuf,
    #[serde(rename = "Version")]
    pub version: u32,
    #[serde(rename = "Port")]
    pub port: u16,
    #[serde(rename = "Crypto")]
    pub crypto: CryptoConfig,
    #[serde(rename = "Database")]
    pub database: DatabaseConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    #[serde(rename = "HashComplexity")]
    pub hash_complexity: u32,
    #[serde(rename = "HashLength")]
    pub hash_length: u32,
    /// Memory cost in mebibytes.
    #[serde(rename = "HashMemory")]
    pub hash_memory: u32,
    #[serde(rename = "HashSalt")]
    pub hash_salt: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    #[serde(rename = "PlayerDriver")]
    pub player_driver: String,
    #[serde(rename = "WorldDriver")]
    pub world_driver: String,
    #[serde(rename = "PlayerDB")]
    pub player_db: String,
    #[serde(rename = "WorldDB")]
    pub world_db: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_players: 1250,
            data_dir: "./data/".into(),
            packet_handler_file: "./data/packets.toml".into(),
            version: 235,
            port: 43594,
            crypto: CryptoConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            hash_complexity: 15,
            hash_length: 32,
            hash_memory: 8,
            hash_salt: "mithril./RUST!RULES/.2024".to_owned(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            player_driver: "sqlite".to_owned(),
            world_driver: "sqlite".to_owned(),
            player_db: "sqlite://data/players.db?mode=rwc".to_owned(),
            world_db: "sqlite://data/world.db?mode=rwc".to_owned(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("decoding {}", path.display()))
    }

    pub fn tls_cert(&self) -> PathBuf {
        self.data_dir.join("ssl/fullchain.pem")
    }

    pub fn tls_key(&self) -> PathBuf {
        self.data_dir.join("ssl/privkey.pem")
    }
}

/// Client→server opcode bindings. The file is a single `[opcodes]` table
/// mapping handler name to opcode; anything unreadable falls back to the
/// built-in table so a missing file never takes the server down.
pub fn load_opcode_table(path: &Path) -> HashMap<String, u8> {
    #[derive(Deserialize)]
    struct PacketFile {
        opcodes: HashMap<String, u8>,
    }

    match std::fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|raw| Ok(toml::from_str::<PacketFile>(&raw)?))
    {
        Ok(file) => file.opcodes,
        Err(e) => {
            warn!("could not load packet table from {}: {e:#}", path.display());
            default_opcode_table()
        }
    }
}

/// The stock client's opcode bindings.
pub fn default_opcode_table() -> HashMap<String, u8> {
    [
        ("walkto", 187_u8),
        ("logout", 102),
        ("ping", 67),
        ("objectaction", 136),
        ("objectaction2", 79),
        ("boundaryaction", 14),
        ("boundaryaction2", 127),
        ("talktonpc", 153),
        ("invonobject", 115),
        ("invonboundary", 161),
        ("invonplayer", 113),
        ("prayeron", 60),
        ("prayeroff", 254),
        ("shopbuy", 236),
        ("shopsell", 221),
        ("shopclose", 166),
    ]
    .into_iter()
    .map(|(name, opcode)| (name.to_owned(), opcode))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_stock_server() {
        let config = Config::default();
        assert_eq!(config.max_players, 1250);
        assert_eq!(config.version, 235);
        assert_eq!(config.port, 43594);
        assert_eq!(config.crypto.hash_length, 32);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str("Port = 12345\n").unwrap();
        assert_eq!(config.port, 12345);
        assert_eq!(config.max_players, 1250);
    }

    #[test]
    fn nested_tables_decode() {
        let config: Config = toml::from_str(
            "[Crypto]\nHashLength = 64\n\n[Database]\nPlayerDB = \"sqlite::memory:\"\n",
        )
        .unwrap();
        assert_eq!(config.crypto.hash_length, 64);
        assert_eq!(config.database.player_db, "sqlite::memory:");
        // Untouched nested fields keep their defaults.
        assert_eq!(config.crypto.hash_memory, 8);
    }
}
