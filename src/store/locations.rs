use mithril_world::{Location, Object, World};
use sqlx::{Row, SqlitePool};
use tracing::{error, info, warn};

/// Loads scenery and boundary spawn records, skipping any tile that is
/// already occupied.
pub async fn load_object_locations(world: &World, pool: &SqlitePool) {
    let rows = match sqlx::query(
        "SELECT `id`, `direction`, `boundary`, `x`, `y` FROM `game_object_locations`",
    )
    .fetch_all(pool)
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            error!("couldn't load object locations: {e}");
            return;
        }
    };

    let mut loaded = 0_usize;
    for row in &rows {
        let boundary = row.get::<i64, _>(2) != 0;
        let loc = Location::new(row.get::<i64, _>(3) as i32, row.get::<i64, _>(4) as i32);
        let object = Object::new(
            row.get::<i64, _>(0) as u32,
            row.get::<i64, _>(1) as u8,
            loc,
            boundary,
        );
        if world.add_object(object).is_ok() {
            loaded += 1;
        }
    }
    info!(loaded, total = rows.len(), "loaded object locations");
}

pub async fn load_npc_locations(world: &World, pool: &SqlitePool) {
    let rows = match sqlx::query(
        "SELECT `id`, `startX`, `minX`, `maxX`, `startY`, `minY`, `maxY` FROM `npc_locations`",
    )
    .fetch_all(pool)
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            error!("couldn't load npc locations: {e}");
            return;
        }
    };

    for row in &rows {
        world.add_npc(
            row.get::<i64, _>(0) as u32,
            Location::new(row.get::<i64, _>(1) as i32, row.get::<i64, _>(4) as i32),
            Location::new(row.get::<i64, _>(2) as i32, row.get::<i64, _>(5) as i32),
            Location::new(row.get::<i64, _>(3) as i32, row.get::<i64, _>(6) as i32),
        );
    }
    info!(loaded = rows.len(), "loaded npc spawns");
}

pub async fn load_item_locations(world: &World, pool: &SqlitePool) {
    let rows = match sqlx::query(
        "SELECT `id`, `amount`, `x`, `y`, `respawn` FROM `item_locations`",
    )
    .fetch_all(pool)
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            error!("couldn't load item locations: {e}");
            return;
        }
    };

    for row in &rows {
        let respawn = row.get::<i64, _>(4);
        world.add_item(
            row.get::<i64, _>(0) as u32,
            row.get::<i64, _>(1) as u32,
            Location::new(row.get::<i64, _>(2) as i32, row.get::<i64, _>(3) as i32),
            None,
            (respawn > 0).then_some(respawn as u32),
        );
    }
    info!(loaded = rows.len(), "loaded ground item spawns");
}

/// Rewrites `game_object_locations` from the live scenery set inside one
/// transaction: delete everything, insert one row per object. Returns the
/// inserted count, or -1 on any failure.
///
/// A delete affecting zero rows is success here; an empty table is a
/// legitimate state to save over.
pub async fn save_object_locations(world: &World, pool: &SqlitePool) -> i64 {
    let mut tx = match pool.begin().await {
        Ok(tx) => tx,
        Err(e) => {
            warn!("couldn't begin object save transaction: {e}");
            return -1;
        }
    };

    if let Err(e) = sqlx::query("DELETE FROM game_object_locations")
        .execute(&mut *tx)
        .await
    {
        warn!("couldn't clear object locations: {e}");
        return -1;
    }

    let mut inserted = 0_i64;
    for object in world.all_scenery() {
        let result = sqlx::query(
            "INSERT INTO game_object_locations(id, direction, x, y, boundary) \
             VALUES(?, ?, ?, ?, ?)",
        )
        .bind(i64::from(object.id))
        .bind(i64::from(object.direction))
        .bind(i64::from(object.loc.x))
        .bind(i64::from(object.loc.y))
        .bind(0_i64)
        .execute(&mut *tx)
        .await;

        match result {
            Ok(done) if done.rows_affected() > 0 => inserted += 1,
            Ok(_) => warn!("object location insert affected no rows"),
            Err(e) => {
                warn!("couldn't insert object location: {e}");
                return -1;
            }
        }
    }

    if let Err(e) = tx.commit().await {
        warn!("couldn't commit object locations: {e}");
        return -1;
    }
    inserted
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mithril_world::Definitions;
    use pretty_assertions::assert_eq;

    use super::*;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE game_object_locations (\
             id INTEGER, direction INTEGER, boundary INTEGER, x INTEGER, y INTEGER)",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    #[tokio::test]
    async fn save_then_load_reproduces_scenery() {
        let pool = memory_pool().await;
        let world = World::new(Arc::new(Definitions::default()));
        world
            .add_object(Object::new(5, 2, Location::new(100, 200), false))
            .unwrap();
        world
            .add_object(Object::new(7, 0, Location::new(101, 200), false))
            .unwrap();

        assert_eq!(save_object_locations(&world, &pool).await, 2);

        let restored = World::new(Arc::new(Definitions::default()));
        load_object_locations(&restored, &pool).await;

        let mut live: Vec<_> = restored
            .all_scenery()
            .iter()
            .map(|o| (o.id, o.loc.x, o.loc.y, o.direction))
            .collect();
        live.sort();
        assert_eq!(live, vec![(5, 100, 200, 2), (7, 101, 200, 0)]);
    }

    #[tokio::test]
    async fn empty_world_save_succeeds() {
        let pool = memory_pool().await;
        let world = World::new(Arc::new(Definitions::default()));

        // A zero-row delete over an empty table is not an error.
        assert_eq!(save_object_locations(&world, &pool).await, 0);
        assert_eq!(save_object_locations(&world, &pool).await, 0);
    }
}
