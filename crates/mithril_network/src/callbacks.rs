use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use mithril_world::{Connection, PlayerProfile};

/// Login response codes. The high bit marks accept-and-continue when a
/// client sets it; the server writes accepts bare (0-3).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum ResponseCode {
    Success = 0,
    Moderator = 1,
    Administrator = 2,
    Reconnected = 3,
    VersionMismatch = 5,
    Rejected = 6,
    WorldFull = 7,
    LoggedInElsewhere = 8,
    BadCredentials = 9,
    SpamThrottle = 10,
    ServerUpdate = 11,
}

pub const ACCEPT_BIT: u8 = 0x80;

impl ResponseCode {
    pub fn accepted(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Moderator | Self::Administrator | Self::Reconnected
        )
    }

    /// Classifies a raw wire byte, honoring the accept bit.
    pub fn byte_accepted(byte: u8) -> bool {
        byte & ACCEPT_BIT != 0 || byte <= 3
    }
}

/// The outcome of a credential check.
pub enum LoginVerdict {
    Accept {
        profile: PlayerProfile,
        code: ResponseCode,
    },
    Reject(ResponseCode),
}

/// The server-side hooks the handshake calls. Implemented by the server
/// binary over its stores and world state; the handshake itself stays free
/// of storage details.
#[async_trait]
pub trait LoginCallbacks: Send + Sync + 'static {
    /// Capacity and availability checks that precede any credential work.
    /// `Some(code)` rejects immediately (world full, update in progress).
    async fn preflight(&self) -> Option<ResponseCode>;

    /// Credential verification and profile load. Runs only after the
    /// version check, throttle check, and login-block decryption.
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        ip: IpAddr,
        reconnecting: bool,
    ) -> LoginVerdict;
}

/// An accepted login traveling from the handshake task to the tick
/// engine's intake phase.
pub struct IncomingPlayer {
    pub profile: PlayerProfile,
    pub ip: IpAddr,
    pub reconnecting: bool,
    pub code: ResponseCode,
    pub conn: Arc<dyn Connection>,
    /// The ISAAC seed for both directions, absent on unciphered sessions.
    pub cipher_seed: Option<[u32; 4]>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_codes() {
        assert!(ResponseCode::Success.accepted());
        assert!(ResponseCode::Reconnected.accepted());
        assert!(!ResponseCode::BadCredentials.accepted());

        assert!(ResponseCode::byte_accepted(0));
        assert!(ResponseCode::byte_accepted(ACCEPT_BIT | 2));
        assert!(!ResponseCode::byte_accepted(9));
    }
}
