//! World state for the mithril game server: the tile grid and its collision
//! masks, the spatial indices used for view culling, and the mobs, objects,
//! and ground items that live on it.
//!
//! Everything here is advanced by the tick engine in the root crate. The
//! mutation discipline is: world state changes happen on the tick, or on a
//! trigger-action task that holds the involved mob's `Busy` bit.

mod appearance;
mod collision;
mod conn;
mod defs;
mod ground_item;
mod inventory;
mod location;
mod mob;
mod npc;
mod object;
mod path;
mod player;
mod region;
mod registry;
mod shop;
mod skills;
mod states;
mod world;

pub mod store;
pub mod sync;
pub mod triggers;

pub use appearance::AppearanceTable;
pub use collision::{clip, CollisionMap, Sector, SECTOR_SIZE};
pub use conn::Connection;
pub use defs::{
    BoundaryDef, Definitions, EquipmentDef, ItemDef, NpcDef, ObjectDef, TileDef,
};
pub use ground_item::GroundItem;
pub use inventory::{Inventory, Item};
pub use location::{base37, Direction, Location, PLANE_HEIGHT};
pub use mob::{dirty, Mobile};
pub use npc::Npc;
pub use object::Object;
pub use path::Path;
pub use player::{DistancedAction, Player, PlayerProfile, TickAction, PRAYER_COUNT};
pub use region::{RegionCoord, RegionView, REGION_SIZE};
pub use registry::{MobRef, Registry};
pub use shop::{Shop, ShopEntry};
pub use skills::{
    experience_to_level, level_to_experience, skill_by_index, Skill, SkillTable, SKILL_COUNT,
};
pub use states::{state, HasStates, StateGuard, States};
pub use triggers::ActionResult;
pub use world::{NpcEvent, World};

/// Sent when an interaction matched no registered trigger.
pub const DEFAULT_ACTION_MESSAGE: &str = "Nothing interesting happens.";

/// Ticks before a dropped item with an owner becomes visible to everyone.
pub const ITEM_PUBLIC_DELAY_TICKS: u64 = 100;
