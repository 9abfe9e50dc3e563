//! Static entity definitions. These are loaded once at startup from the
//! definition store and passed to the world as an immutable bundle; nothing
//! in the core mutates them.

/// The item id of coins, the currency shops trade in.
pub(crate) const COIN_ID: u32 = 10;

#[derive(Clone, Default, Debug)]
pub struct ObjectDef {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub commands: [String; 2],
    pub kind: i32,
    pub width: i32,
    pub height: i32,
    pub ground_item_var: i32,
}

impl ObjectDef {
    /// Types 2 and 3 are open scenery a mob can stand against rather than a
    /// solid footprint.
    pub fn solid(&self) -> bool {
        self.kind != 2 && self.kind != 3
    }
}

#[derive(Clone, Default, Debug)]
pub struct BoundaryDef {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub commands: [String; 2],
    pub traversable: i32,
    pub unknown: i32,
}

#[derive(Clone, Default, Debug)]
pub struct ItemDef {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub command: String,
    pub base_price: i32,
    pub stackable: bool,
    pub quest: bool,
    pub members: bool,
}

#[derive(Clone, Default, Debug)]
pub struct NpcDef {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub command: String,
    pub hits: i32,
    pub attack: i32,
    pub strength: i32,
    pub defense: i32,
    pub attackable: bool,
}

impl NpcDef {
    /// NPCs with an "attack" command chase players in range.
    pub fn aggressive(&self) -> bool {
        self.command.eq_ignore_ascii_case("attack")
    }
}

#[derive(Clone, Default, Debug)]
pub struct TileDef {
    pub color: i32,
    pub visible: i32,
    // The source schema aliases this column ambiguously; the raw value is
    // kept and only ever tested against zero.
    pub blocked: i32,
}

#[derive(Clone, Default, Debug)]
pub struct EquipmentDef {
    pub id: u32,
    pub sprite: i32,
    pub kind: i32,
    pub armour: i32,
    pub magic: i32,
    pub prayer: i32,
    pub ranged: i32,
    pub aim: i32,
    pub power: i32,
    pub position: i32,
    pub female_only: bool,
}

/// The immutable definition bundle, indexed by id.
#[derive(Default)]
pub struct Definitions {
    pub objects: Vec<ObjectDef>,
    pub boundaries: Vec<BoundaryDef>,
    pub items: Vec<ItemDef>,
    pub npcs: Vec<NpcDef>,
    pub tiles: Vec<TileDef>,
    pub equipment: Vec<EquipmentDef>,
}

impl Definitions {
    pub fn object(&self, id: u32) -> Option<&ObjectDef> {
        self.objects.get(id as usize)
    }

    pub fn boundary(&self, id: u32) -> Option<&BoundaryDef> {
        self.boundaries.get(id as usize)
    }

    pub fn item(&self, id: u32) -> Option<&ItemDef> {
        self.items.get(id as usize)
    }

    pub fn npc(&self, id: u32) -> Option<&NpcDef> {
        self.npcs.get(id as usize)
    }
}
