//! Server→client opcodes. Client→server opcodes come from the packet table
//! in the server configuration; these are fixed by the client.

pub const PLAYER_POSITIONS: u8 = 191;
pub const NPC_POSITIONS: u8 = 79;
pub const PLAYER_APPEARANCES: u8 = 234;
pub const NPC_EVENTS: u8 = 104;
pub const OBJECT_LOCATIONS: u8 = 48;
pub const BOUNDARY_LOCATIONS: u8 = 91;
pub const ITEM_LOCATIONS: u8 = 99;
pub const CLEAR_DISTANT_CHUNKS: u8 = 211;
pub const PLANE_INFO: u8 = 25;

pub const WELCOME_INFO: u8 = 182;
pub const SERVER_MESSAGE: u8 = 131;
pub const STATS: u8 = 156;
pub const PRAYER_STATUS: u8 = 206;
pub const INVENTORY_ITEMS: u8 = 53;
pub const SHOP_OPEN: u8 = 101;
pub const SHOP_CLOSE: u8 = 137;
pub const LOGOUT: u8 = 4;
