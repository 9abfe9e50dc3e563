use async_trait::async_trait;
use mithril_world::store::PlayerStore;
use mithril_world::{base37, AppearanceTable, Item, PlayerProfile};
use sqlx::{Row, SqlitePool};
use tracing::warn;

use super::PasswordHasher;

/// The SQLite player profile store. Passwords are stored as configured
/// argon2 hashes; the handshake hashes before it ever reaches here.
pub struct SqlPlayerStore {
    pool: SqlitePool,
}

impl SqlPlayerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates the profile tables when they do not exist yet.
    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS players (\
             username_hash INTEGER PRIMARY KEY, \
             username TEXT NOT NULL, \
             password_hash TEXT NOT NULL, \
             rank INTEGER NOT NULL DEFAULT 0, \
             x INTEGER NOT NULL DEFAULT 220, \
             y INTEGER NOT NULL DEFAULT 445, \
             head INTEGER NOT NULL DEFAULT 1, \
             body INTEGER NOT NULL DEFAULT 2, \
             male INTEGER NOT NULL DEFAULT 1, \
             head_color INTEGER NOT NULL DEFAULT 2, \
             body_color INTEGER NOT NULL DEFAULT 8, \
             legs_color INTEGER NOT NULL DEFAULT 14, \
             skin_color INTEGER NOT NULL DEFAULT 0)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS player_skills (\
             username_hash INTEGER NOT NULL, \
             skill INTEGER NOT NULL, \
             current INTEGER NOT NULL, \
             maximum INTEGER NOT NULL, \
             experience INTEGER NOT NULL, \
             PRIMARY KEY (username_hash, skill))",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS player_inventory (\
             username_hash INTEGER NOT NULL, \
             slot INTEGER NOT NULL, \
             item_id INTEGER NOT NULL, \
             amount INTEGER NOT NULL, \
             PRIMARY KEY (username_hash, slot))",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Registers a new account. Used by tooling and tests; the live server
    /// never creates accounts mid-session.
    pub async fn create_account(
        &self,
        username: &str,
        password_hash: &str,
        x: i32,
        y: i32,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO players (username_hash, username, password_hash, x, y) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(base37(username) as i64)
        .bind(username)
        .bind(password_hash)
        .bind(i64::from(x))
        .bind(i64::from(y))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PlayerStore for SqlPlayerStore {
    async fn name_exists(&self, username: &str) -> bool {
        sqlx::query("SELECT 1 FROM players WHERE username_hash = ?")
            .bind(base37(username) as i64)
            .fetch_optional(&self.pool)
            .await
            .map(|row| row.is_some())
            .unwrap_or_else(|e| {
                warn!("name lookup failed: {e}");
                false
            })
    }

    async fn valid_login(&self, name_hash: u64, password_hash: &str) -> bool {
        sqlx::query("SELECT 1 FROM players WHERE username_hash = ? AND password_hash = ?")
            .bind(name_hash as i64)
            .bind(password_hash)
            .fetch_optional(&self.pool)
            .await
            .map(|row| row.is_some())
            .unwrap_or_else(|e| {
                warn!("login check failed: {e}");
                false
            })
    }

    async fn load(&self, username: &str) -> Option<PlayerProfile> {
        let hash = base37(username) as i64;

        let row = match sqlx::query(
            "SELECT username, rank, x, y, head, body, male, head_color, body_color, \
             legs_color, skin_color FROM players WHERE username_hash = ?",
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
        {
            Ok(Some(row)) => row,
            Ok(None) => return None,
            Err(e) => {
                warn!("profile load failed: {e}");
                return None;
            }
        };

        let mut profile = PlayerProfile {
            username: row.get(0),
            rank: row.get::<i64, _>(1) as u8,
            x: row.get::<i64, _>(2) as i32,
            y: row.get::<i64, _>(3) as i32,
            appearance: Some(AppearanceTable::new(
                row.get::<i64, _>(4) as i32,
                row.get::<i64, _>(5) as i32,
                row.get::<i64, _>(6) != 0,
                row.get::<i64, _>(7) as i32,
                row.get::<i64, _>(8) as i32,
                row.get::<i64, _>(9) as i32,
                row.get::<i64, _>(10) as i32,
            )),
            skills: Vec::new(),
            inventory: Vec::new(),
        };

        if let Ok(rows) = sqlx::query(
            "SELECT skill, current, maximum, experience FROM player_skills \
             WHERE username_hash = ? ORDER BY skill",
        )
        .bind(hash)
        .fetch_all(&self.pool)
        .await
        {
            profile.skills = vec![(1, 1, 0); mithril_world::SKILL_COUNT];
            for row in rows {
                let index = row.get::<i64, _>(0) as usize;
                if let Some(slot) = profile.skills.get_mut(index) {
                    *slot = (
                        row.get::<i64, _>(1) as i32,
                        row.get::<i64, _>(2) as i32,
                        row.get::<i64, _>(3),
                    );
                }
            }
        }

        if let Ok(rows) = sqlx::query(
            "SELECT item_id, amount FROM player_inventory WHERE username_hash = ? ORDER BY slot",
        )
        .bind(hash)
        .fetch_all(&self.pool)
        .await
        {
            profile.inventory = rows
                .iter()
                .map(|row| Item {
                    id: row.get::<i64, _>(0) as u32,
                    amount: row.get::<i64, _>(1) as u32,
                })
                .collect();
        }

        Some(profile)
    }

    async fn save(&self, profile: &PlayerProfile) -> anyhow::Result<()> {
        let hash = base37(&profile.username) as i64;
        let mut tx = self.pool.begin().await?;

        let appearance = profile.appearance.unwrap_or_default();
        sqlx::query(
            "UPDATE players SET rank = ?, x = ?, y = ?, head = ?, body = ?, male = ?, \
             head_color = ?, body_color = ?, legs_color = ?, skin_color = ? \
             WHERE username_hash = ?",
        )
        .bind(i64::from(profile.rank))
        .bind(i64::from(profile.x))
        .bind(i64::from(profile.y))
        .bind(i64::from(appearance.head))
        .bind(i64::from(appearance.body))
        .bind(i64::from(appearance.male))
        .bind(i64::from(appearance.head_color))
        .bind(i64::from(appearance.body_color))
        .bind(i64::from(appearance.legs_color))
        .bind(i64::from(appearance.skin_color))
        .bind(hash)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM player_skills WHERE username_hash = ?")
            .bind(hash)
            .execute(&mut *tx)
            .await?;
        for (index, &(current, maximum, experience)) in profile.skills.iter().enumerate() {
            sqlx::query(
                "INSERT INTO player_skills (username_hash, skill, current, maximum, experience) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(hash)
            .bind(index as i64)
            .bind(i64::from(current))
            .bind(i64::from(maximum))
            .bind(experience)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM player_inventory WHERE username_hash = ?")
            .bind(hash)
            .execute(&mut *tx)
            .await?;
        for (slot, item) in profile.inventory.iter().enumerate() {
            sqlx::query(
                "INSERT INTO player_inventory (username_hash, slot, item_id, amount) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(hash)
            .bind(slot as i64)
            .bind(i64::from(item.id))
            .bind(i64::from(item.amount))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqlPlayerStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = SqlPlayerStore::new(pool);
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn missing_profile_loads_none() {
        let store = store().await;
        assert!(!store.name_exists("alice").await);
        assert!(store.load("alice").await.is_none());
    }

    #[tokio::test]
    async fn credentials_are_checked_by_hash() {
        let store = store().await;
        store.create_account("alice", "deadbeef", 220, 445).await.unwrap();

        assert!(store.name_exists("alice").await);
        assert!(store.valid_login(base37("alice"), "deadbeef").await);
        assert!(!store.valid_login(base37("alice"), "feedface").await);
        assert!(!store.valid_login(base37("bob"), "deadbeef").await);
    }

    #[tokio::test]
    async fn logout_persistence_round_trip() {
        let store = store().await;
        store.create_account("alice", "deadbeef", 220, 445).await.unwrap();

        let mut profile = store.load("alice").await.unwrap();
        profile.inventory = vec![Item {
            id: 995,
            amount: 42,
        }];
        profile.x = 300;
        profile.skills = vec![(1, 1, 0); mithril_world::SKILL_COUNT];
        profile.skills[0] = (40, 40, 99_999);
        store.save(&profile).await.unwrap();

        let restored = store.load("alice").await.unwrap();
        assert_eq!(restored.inventory, vec![Item { id: 995, amount: 42 }]);
        assert_eq!(restored.x, 300);
        assert_eq!(restored.skills[0], (40, 40, 99_999));
    }
}
