use mithril_world::{
    BoundaryDef, Definitions, EquipmentDef, ItemDef, NpcDef, ObjectDef, TileDef,
};
use sqlx::{Row, SqlitePool};
use tracing::{error, info};

/// Loads every definition set from the world database. A failed query
/// leaves that set empty and the server keeps going.
pub async fn load_definitions(pool: &SqlitePool) -> Definitions {
    let defs = Definitions {
        objects: load_objects(pool).await,
        boundaries: load_boundaries(pool).await,
        items: load_items(pool).await,
        npcs: load_npcs(pool).await,
        tiles: load_tiles(pool).await,
        equipment: load_equipment(pool).await,
    };
    info!(
        objects = defs.objects.len(),
        boundaries = defs.boundaries.len(),
        items = defs.items.len(),
        npcs = defs.npcs.len(),
        tiles = defs.tiles.len(),
        "loaded definitions"
    );
    defs
}

async fn load_objects(pool: &SqlitePool) -> Vec<ObjectDef> {
    let rows = match sqlx::query(
        "SELECT id, name, description, command_one, command_two, type, width, height, \
         ground_item_var FROM `game_objects`",
    )
    .fetch_all(pool)
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            error!("couldn't load object definitions: {e}");
            return Vec::new();
        }
    };

    rows.iter()
        .map(|row| ObjectDef {
            id: row.get::<i64, _>(0) as u32,
            name: row.get(1),
            description: row.get(2),
            commands: [
                row.get::<String, _>(3).to_lowercase(),
                row.get::<String, _>(4).to_lowercase(),
            ],
            kind: row.get::<i64, _>(5) as i32,
            width: row.get::<i64, _>(6) as i32,
            height: row.get::<i64, _>(7) as i32,
            ground_item_var: row.get::<i64, _>(8) as i32,
        })
        .collect()
}

async fn load_boundaries(pool: &SqlitePool) -> Vec<BoundaryDef> {
    let rows = match sqlx::query(
        "SELECT id, name, description, command_one, command_two, door_type, unknown \
         FROM `doors` ORDER BY id",
    )
    .fetch_all(pool)
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            error!("couldn't load boundary definitions: {e}");
            return Vec::new();
        }
    };

    rows.iter()
        .map(|row| BoundaryDef {
            id: row.get::<i64, _>(0) as u32,
            name: row.get(1),
            description: row.get(2),
            commands: [
                row.get::<String, _>(3).to_lowercase(),
                row.get::<String, _>(4).to_lowercase(),
            ],
            traversable: row.get::<i64, _>(5) as i32,
            unknown: row.get::<i64, _>(6) as i32,
        })
        .collect()
}

async fn load_items(pool: &SqlitePool) -> Vec<ItemDef> {
    let rows = match sqlx::query(
        "SELECT id, name, description, command, base_price, stackable, special, members \
         FROM `items` ORDER BY id",
    )
    .fetch_all(pool)
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            error!("couldn't load item definitions: {e}");
            return Vec::new();
        }
    };

    rows.iter()
        .map(|row| ItemDef {
            id: row.get::<i64, _>(0) as u32,
            name: row.get(1),
            description: row.get(2),
            command: row.get(3),
            base_price: row.get::<i64, _>(4) as i32,
            stackable: row.get::<i64, _>(5) != 0,
            quest: row.get::<i64, _>(6) != 0,
            members: row.get::<i64, _>(7) != 0,
        })
        .collect()
}

async fn load_npcs(pool: &SqlitePool) -> Vec<NpcDef> {
    let rows = match sqlx::query(
        "SELECT id, name, description, command, hits, attack, strength, defense, attackable \
         FROM `npcs` ORDER BY id",
    )
    .fetch_all(pool)
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            error!("couldn't load npc definitions: {e}");
            return Vec::new();
        }
    };

    rows.iter()
        .map(|row| NpcDef {
            id: row.get::<i64, _>(0) as u32,
            name: row.get(1),
            description: row.get(2),
            command: row.get(3),
            hits: row.get::<i64, _>(4) as i32,
            attack: row.get::<i64, _>(5) as i32,
            strength: row.get::<i64, _>(6) as i32,
            defense: row.get::<i64, _>(7) as i32,
            attackable: row.get::<i64, _>(8) != 0,
        })
        .collect()
}

async fn load_tiles(pool: &SqlitePool) -> Vec<TileDef> {
    // The third column's alias in the source schema is ambiguous; the value
    // is stored verbatim and only ever tested against zero.
    let rows = match sqlx::query("SELECT colour, unknown, objectType FROM `tiles`")
        .fetch_all(pool)
        .await
    {
        Ok(rows) => rows,
        Err(e) => {
            error!("couldn't load tile definitions: {e}");
            return Vec::new();
        }
    };

    rows.iter()
        .map(|row| TileDef {
            color: row.get::<i64, _>(0) as i32,
            visible: row.get::<i64, _>(1) as i32,
            blocked: row.get::<i64, _>(2) as i32,
        })
        .collect()
}

async fn load_equipment(pool: &SqlitePool) -> Vec<EquipmentDef> {
    let rows = match sqlx::query(
        "SELECT id, sprite, type, armour_points, magic_points, prayer_points, range_points, \
         weapon_aim_points, weapon_power_points, pos, femaleOnly FROM `item_wieldable`",
    )
    .fetch_all(pool)
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            error!("couldn't load equipment definitions: {e}");
            return Vec::new();
        }
    };

    rows.iter()
        .map(|row| EquipmentDef {
            id: row.get::<i64, _>(0) as u32,
            sprite: row.get::<i64, _>(1) as i32,
            kind: row.get::<i64, _>(2) as i32,
            armour: row.get::<i64, _>(3) as i32,
            magic: row.get::<i64, _>(4) as i32,
            prayer: row.get::<i64, _>(5) as i32,
            ranged: row.get::<i64, _>(6) as i32,
            aim: row.get::<i64, _>(7) as i32,
            power: row.get::<i64, _>(8) as i32,
            position: row.get::<i64, _>(9) as i32,
            female_only: row.get::<i64, _>(10) != 0,
        })
        .collect()
}
