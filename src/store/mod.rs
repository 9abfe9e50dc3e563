//! Persistence: the SQLite-backed definition and profile stores.
//!
//! Load failures follow one policy: log and continue with an empty dataset
//! for that definition set. Only opening the pools is fatal, and only at
//! startup.

mod defs;
mod hash;
mod locations;
mod player;

use anyhow::Context;
pub use defs::load_definitions;
pub use hash::PasswordHasher;
pub use locations::{
    load_item_locations, load_npc_locations, load_object_locations, save_object_locations,
};
pub use player::SqlPlayerStore;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::config::DatabaseConfig;

/// The two database pools: world (definitions, spawn locations) and player
/// profiles.
pub struct Stores {
    pub world_db: SqlitePool,
    pub player_db: SqlitePool,
}

impl Stores {
    pub async fn open(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let world_db = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&config.world_db)
            .await
            .with_context(|| format!("opening world database {}", config.world_db))?;

        let player_db = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&config.player_db)
            .await
            .with_context(|| format!("opening player database {}", config.player_db))?;

        Ok(Self {
            world_db,
            player_db,
        })
    }
}
