//! Interfaces the core consumes from the persistence layer. The server
//! binary wires these to its SQL stores; tests use in-memory stands-in.

use async_trait::async_trait;

use crate::PlayerProfile;

/// The player profile store.
#[async_trait]
pub trait PlayerStore: Send + Sync + 'static {
    async fn name_exists(&self, username: &str) -> bool;

    /// Checks credentials without loading the profile. `password_hash` is
    /// the already-hashed password; the store never sees plaintext.
    async fn valid_login(&self, name_hash: u64, password_hash: &str) -> bool;

    /// Loads a profile. `None` means the profile is missing or unreadable.
    async fn load(&self, username: &str) -> Option<PlayerProfile>;

    async fn save(&self, profile: &PlayerProfile) -> anyhow::Result<()>;
}
