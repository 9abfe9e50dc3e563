use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::{CollisionMap, Direction, Location, Path};

/// Per-tick dirty flags. The broadcast phase reads them; the reset phase
/// clears them on every mob.
pub mod dirty {
    pub const REGION_REMOVED: u32 = 1;
    pub const REGION_MOVED: u32 = 1 << 1;
    pub const SPRITE_UPDATED: u32 = 1 << 2;
    pub const APPEARANCE_CHANGED: u32 = 1 << 3;

    pub const ALL: u32 = REGION_REMOVED | REGION_MOVED | SPRITE_UPDATED | APPEARANCE_CHANGED;
}

/// The movement core shared by players and NPCs: a location, a facing
/// direction, the current path, and the per-tick dirty flags.
pub struct Mobile {
    loc: RwLock<Location>,
    direction: RwLock<Direction>,
    path: Mutex<Option<Path>>,
    dirty: AtomicU32,
}

impl Mobile {
    pub fn at(loc: Location) -> Self {
        Self {
            loc: RwLock::new(loc),
            direction: RwLock::new(Direction::North),
            path: Mutex::new(None),
            dirty: AtomicU32::new(0),
        }
    }

    pub fn loc(&self) -> Location {
        *self.loc.read()
    }

    /// Teleport-style relocation: no pathing, flags the sprite and region as
    /// moved. Returns the vacated tile.
    pub fn set_loc(&self, to: Location) -> Location {
        let mut loc = self.loc.write();
        let from = *loc;
        *loc = to;
        self.mark(dirty::REGION_MOVED | dirty::SPRITE_UPDATED);
        from
    }

    pub fn direction(&self) -> Direction {
        *self.direction.read()
    }

    pub fn set_direction(&self, dir: Direction) {
        *self.direction.write() = dir;
        self.mark(dirty::SPRITE_UPDATED);
    }

    pub fn face(&self, target: Location) {
        self.set_direction(self.loc().direction_to(target));
    }

    pub fn set_path(&self, path: Path) {
        *self.path.lock() = Some(path);
    }

    pub fn reset_path(&self) {
        *self.path.lock() = None;
    }

    pub fn has_path(&self) -> bool {
        self.path.lock().as_ref().is_some_and(|p| !p.is_finished())
    }

    /// Advances the path by one step. Returns `(from, to)` when a step was
    /// taken; the caller moves region membership.
    pub fn advance(&self, collision: &CollisionMap) -> Option<(Location, Location)> {
        let mut path = self.path.lock();
        let active = path.as_mut()?;

        let from = self.loc();
        let Some(to) = active.next_step(collision, from) else {
            *path = None;
            return None;
        };

        *self.loc.write() = to;
        *self.direction.write() = from.direction_to(to);
        self.mark(dirty::REGION_MOVED | dirty::SPRITE_UPDATED);

        if active.is_finished() {
            *path = None;
        }
        Some((from, to))
    }

    pub fn mark(&self, bits: u32) {
        self.dirty.fetch_or(bits, Ordering::SeqCst);
    }

    pub fn is_dirty(&self, bits: u32) -> bool {
        self.dirty.load(Ordering::SeqCst) & bits != 0
    }

    /// Clears every per-tick flag. Runs in the tick's reset phase.
    pub fn reset_dirty(&self) {
        self.dirty.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_walks_and_flags() {
        let map = CollisionMap::new();
        let mob = Mobile::at(Location::new(50, 50));
        mob.set_path(Path::to(Location::new(52, 50)));

        let (from, to) = mob.advance(&map).unwrap();
        assert_eq!(from, Location::new(50, 50));
        assert_eq!(to, Location::new(51, 50));
        assert_eq!(mob.direction(), Direction::East);
        assert!(mob.is_dirty(dirty::REGION_MOVED));

        mob.reset_dirty();
        assert!(!mob.is_dirty(dirty::ALL));

        mob.advance(&map).unwrap();
        assert!(mob.advance(&map).is_none());
        assert!(!mob.has_path());
    }
}
