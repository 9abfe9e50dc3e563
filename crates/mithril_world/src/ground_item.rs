use crate::{Location, ITEM_PUBLIC_DELAY_TICKS};

/// An item stack lying on a tile. Items with an owner hash are visible only
/// to their owner until the public delay elapses; items loaded from spawn
/// records re-emit on their respawn period once picked up.
#[derive(Clone, Debug)]
pub struct GroundItem {
    /// Unique per spawn, so view diffing can tell re-spawned stacks apart.
    pub seq: u64,
    pub id: u32,
    pub amount: u32,
    pub loc: Location,
    pub owner: Option<u64>,
    pub spawn_tick: u64,
    /// Ticks between removal and re-emission for persistent spawners.
    pub respawn: Option<u32>,
}

impl GroundItem {
    /// Whether the given viewer (by username hash) can see this stack yet.
    pub fn visible_to(&self, viewer: u64, current_tick: u64) -> bool {
        match self.owner {
            None => true,
            Some(owner) => {
                owner == viewer || current_tick.saturating_sub(self.spawn_tick) >= ITEM_PUBLIC_DELAY_TICKS
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(owner: Option<u64>, spawn_tick: u64) -> GroundItem {
        GroundItem {
            seq: 1,
            id: 995,
            amount: 5,
            loc: Location::new(0, 0),
            owner,
            spawn_tick,
            respawn: None,
        }
    }

    #[test]
    fn ownerless_items_are_public() {
        assert!(item(None, 0).visible_to(123, 0));
    }

    #[test]
    fn owned_items_go_public_after_delay() {
        let it = item(Some(42), 100);
        assert!(it.visible_to(42, 100));
        assert!(!it.visible_to(123, 100));
        assert!(it.visible_to(123, 100 + ITEM_PUBLIC_DELAY_TICKS));
    }
}
