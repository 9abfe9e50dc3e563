use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use mithril_network::{LoginCallbacks, LoginVerdict, ResponseCode};
use mithril_world::store::PlayerStore;
use mithril_world::{base37, World};
use tracing::warn;

use crate::store::PasswordHasher;

/// Wires the handshake to world capacity and the profile store.
pub struct ServerCallbacks {
    world: Arc<World>,
    store: Arc<dyn PlayerStore>,
    hasher: PasswordHasher,
    max_players: usize,
}

impl ServerCallbacks {
    pub fn new(
        world: Arc<World>,
        store: Arc<dyn PlayerStore>,
        hasher: PasswordHasher,
        max_players: usize,
    ) -> Self {
        Self {
            world,
            store,
            hasher,
            max_players,
        }
    }
}

#[async_trait]
impl LoginCallbacks for ServerCallbacks {
    async fn preflight(&self) -> Option<ResponseCode> {
        if self.world.update_in_progress() {
            return Some(ResponseCode::ServerUpdate);
        }
        if self.world.players.len() >= self.max_players {
            return Some(ResponseCode::WorldFull);
        }
        None
    }

    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        _ip: IpAddr,
        reconnecting: bool,
    ) -> LoginVerdict {
        let hash = base37(username);

        if self.world.player_by_hash(hash).is_some() {
            return LoginVerdict::Reject(ResponseCode::LoggedInElsewhere);
        }

        let password_hash = match self.hasher.hash(password) {
            Ok(hash) => hash,
            Err(e) => {
                warn!("password hashing failed: {e:#}");
                return LoginVerdict::Reject(ResponseCode::BadCredentials);
            }
        };

        if !self.store.name_exists(username).await
            || !self.store.valid_login(hash, &password_hash).await
        {
            return LoginVerdict::Reject(ResponseCode::BadCredentials);
        }

        let Some(profile) = self.store.load(username).await else {
            warn!(username, "credentials valid but profile failed to load");
            return LoginVerdict::Reject(ResponseCode::BadCredentials);
        };

        let code = if reconnecting {
            ResponseCode::Reconnected
        } else {
            match profile.rank {
                2 => ResponseCode::Administrator,
                1 => ResponseCode::Moderator,
                _ => ResponseCode::Success,
            }
        };

        LoginVerdict::Accept { profile, code }
    }
}
