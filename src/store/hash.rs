use std::fmt::Write;

use anyhow::Context;
use argon2::{Algorithm, Argon2, Params, Version};

use crate::config::CryptoConfig;

/// Argon2id password hashing with parameters from the `Crypto` section of
/// the configuration. The salt is server-wide and configured, not stored
/// per user.
pub struct PasswordHasher {
    argon: Argon2<'static>,
    salt: String,
    length: usize,
}

impl PasswordHasher {
    pub fn new(config: &CryptoConfig) -> anyhow::Result<Self> {
        let length = config.hash_length as usize;
        let params = Params::new(
            config.hash_memory * 1024, // mebibytes to kibibytes
            config.hash_complexity,
            1,
            Some(length),
        )
        .map_err(|e| anyhow::anyhow!("invalid hash parameters: {e}"))?;

        anyhow::ensure!(config.hash_salt.len() >= 8, "hash salt too short");

        Ok(Self {
            argon: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            salt: config.hash_salt.clone(),
            length,
        })
    }

    /// Hashes a password to lowercase hex.
    pub fn hash(&self, password: &str) -> anyhow::Result<String> {
        let mut out = vec![0_u8; self.length];
        self.argon
            .hash_password_into(password.as_bytes(), self.salt.as_bytes(), &mut out)
            .map_err(|e| anyhow::anyhow!("hashing password: {e}"))
            .context("argon2")?;

        let mut hex = String::with_capacity(out.len() * 2);
        for byte in out {
            write!(hex, "{byte:02x}").expect("writing to a string");
        }
        Ok(hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(&CryptoConfig {
            hash_complexity: 2,
            hash_length: 32,
            hash_memory: 8,
            hash_salt: "test-salt".to_owned(),
        })
        .unwrap()
    }

    #[test]
    fn hashing_is_deterministic() {
        let h = hasher();
        assert_eq!(h.hash("hunter2").unwrap(), h.hash("hunter2").unwrap());
    }

    #[test]
    fn wrong_password_differs() {
        let h = hasher();
        assert_ne!(h.hash("hunter2").unwrap(), h.hash("hunter3").unwrap());
    }

    #[test]
    fn output_length_follows_config() {
        let h = hasher();
        assert_eq!(h.hash("hunter2").unwrap().len(), 64);
    }
}
