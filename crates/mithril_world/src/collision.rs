use std::collections::HashMap;

use parking_lot::RwLock;

use crate::{Direction, Location};

/// Tiles per sector side. Sectors store the terrain collision masks in
/// contiguous blocks loaded once at startup.
pub const SECTOR_SIZE: i32 = 48;

/// Collision mask bits. An edge bit means that side of the tile is blocked.
pub mod clip {
    pub const NORTH: u8 = 1;
    pub const EAST: u8 = 1 << 1;
    pub const SOUTH: u8 = 1 << 2;
    pub const WEST: u8 = 1 << 3;
    pub const DIAGONAL: u8 = 1 << 4;
    pub const FULL: u8 = 1 << 5;
}

fn edge_bit(dir: Direction) -> u8 {
    match dir {
        Direction::North => clip::NORTH,
        Direction::East => clip::EAST,
        Direction::South => clip::SOUTH,
        Direction::West => clip::WEST,
        _ => clip::DIAGONAL,
    }
}

fn opposite(dir: Direction) -> Direction {
    match dir {
        Direction::North => Direction::South,
        Direction::East => Direction::West,
        Direction::South => Direction::North,
        Direction::West => Direction::East,
        Direction::NorthEast => Direction::SouthWest,
        Direction::SouthEast => Direction::NorthWest,
        Direction::SouthWest => Direction::NorthEast,
        Direction::NorthWest => Direction::SouthEast,
    }
}

/// A sector's tile masks: the immutable terrain base plus the overlay
/// contributed by live boundaries and solid scenery.
pub struct Sector {
    base: Box<[u8]>,
    overlay: Box<[u8]>,
}

impl Sector {
    pub fn from_base(base: Vec<u8>) -> Self {
        assert_eq!(base.len(), (SECTOR_SIZE * SECTOR_SIZE) as usize);
        Self {
            overlay: vec![0; base.len()].into_boxed_slice(),
            base: base.into_boxed_slice(),
        }
    }

    pub fn open() -> Self {
        Self::from_base(vec![0; (SECTOR_SIZE * SECTOR_SIZE) as usize])
    }

    fn idx(loc: Location) -> usize {
        let x = loc.x.rem_euclid(SECTOR_SIZE);
        let y = loc.y.rem_euclid(SECTOR_SIZE);
        (y * SECTOR_SIZE + x) as usize
    }

    fn mask(&self, loc: Location) -> u8 {
        let i = Self::idx(loc);
        self.base[i] | self.overlay[i]
    }
}

/// The world's collision masks, keyed by sector coordinate. Tiles in
/// unloaded sectors are open ground.
///
/// The invariant maintained here: a tile's effective mask equals its base
/// terrain mask OR'd with every live boundary touching it and every solid
/// scenery footprint covering it.
#[derive(Default)]
pub struct CollisionMap {
    sectors: RwLock<HashMap<(i32, i32), Sector>>,
}

impl CollisionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_sector(&self, sx: i32, sy: i32, sector: Sector) {
        self.sectors.write().insert((sx, sy), sector);
    }

    pub fn sector_count(&self) -> usize {
        self.sectors.read().len()
    }

    fn sector_coord(loc: Location) -> (i32, i32) {
        (loc.x.div_euclid(SECTOR_SIZE), loc.y.div_euclid(SECTOR_SIZE))
    }

    pub fn mask(&self, loc: Location) -> u8 {
        self.sectors
            .read()
            .get(&Self::sector_coord(loc))
            .map_or(0, |s| s.mask(loc))
    }

    /// True if the given mask bits are set on the tile, or the tile is fully
    /// blocked.
    pub fn blocked(&self, loc: Location, bits: u8) -> bool {
        let mask = self.mask(loc);
        mask & clip::FULL != 0 || mask & bits != 0
    }

    fn or_overlay(&self, loc: Location, bits: u8) {
        let mut sectors = self.sectors.write();
        let sector = sectors
            .entry(Self::sector_coord(loc))
            .or_insert_with(Sector::open);
        sector.overlay[Sector::idx(loc)] |= bits;
    }

    fn clear_overlay(&self, loc: Location, bits: u8) {
        if let Some(sector) = self.sectors.write().get_mut(&Self::sector_coord(loc)) {
            sector.overlay[Sector::idx(loc)] &= !bits;
        }
    }

    /// Applies a boundary facing `dir` at `loc`: the tile's edge bit and the
    /// matching edge of the neighbour across it.
    pub fn place_boundary(&self, loc: Location, dir: Direction) {
        let bit = edge_bit(dir);
        self.or_overlay(loc, bit);
        if bit != clip::DIAGONAL {
            let (dx, dy) = dir.delta();
            self.or_overlay(loc.translate(dx, dy), edge_bit(opposite(dir)));
        }
    }

    pub fn remove_boundary(&self, loc: Location, dir: Direction) {
        let bit = edge_bit(dir);
        self.clear_overlay(loc, bit);
        if bit != clip::DIAGONAL {
            let (dx, dy) = dir.delta();
            self.clear_overlay(loc.translate(dx, dy), edge_bit(opposite(dir)));
        }
    }

    /// Fully blocks a scenery footprint of `width` x `height` tiles.
    pub fn place_footprint(&self, min: Location, width: i32, height: i32) {
        for dx in 0..width {
            for dy in 0..height {
                self.or_overlay(min.translate(dx, dy), clip::FULL);
            }
        }
    }

    pub fn remove_footprint(&self, min: Location, width: i32, height: i32) {
        for dx in 0..width {
            for dy in 0..height {
                self.clear_overlay(min.translate(dx, dy), clip::FULL);
            }
        }
    }

    /// Whether a mob standing on `from` may take one step in `dir`.
    ///
    /// A cardinal step requires the shared edge clear on both tiles and the
    /// destination not fully blocked. A diagonal step additionally requires
    /// both flanking cardinal steps to be clear.
    pub fn step_allowed(&self, from: Location, dir: Direction) -> bool {
        let (dx, dy) = dir.delta();
        let to = from.translate(dx, dy);

        if self.mask(to) & clip::FULL != 0 {
            return false;
        }

        match dir {
            Direction::North | Direction::East | Direction::South | Direction::West => {
                self.mask(from) & edge_bit(dir) == 0 && self.mask(to) & edge_bit(opposite(dir)) == 0
            }
            _ => {
                if self.mask(to) & clip::DIAGONAL != 0 {
                    return false;
                }
                let horiz = if dx > 0 { Direction::East } else { Direction::West };
                let vert = if dy > 0 { Direction::North } else { Direction::South };
                // Both L-shaped routes around the corner must be open.
                self.step_allowed(from, horiz)
                    && self.step_allowed(from, vert)
                    && self.step_allowed(from.translate(dx, 0), vert)
                    && self.step_allowed(from.translate(0, dy), horiz)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_world_allows_all_steps() {
        let map = CollisionMap::new();
        let from = Location::new(100, 100);
        for dir in [
            Direction::North,
            Direction::NorthEast,
            Direction::East,
            Direction::SouthWest,
        ] {
            assert!(map.step_allowed(from, dir));
        }
    }

    #[test]
    fn boundary_blocks_both_sides() {
        let map = CollisionMap::new();
        let loc = Location::new(10, 10);

        map.place_boundary(loc, Direction::North);
        assert!(!map.step_allowed(loc, Direction::North));
        assert!(!map.step_allowed(Location::new(10, 11), Direction::South));
        assert!(map.step_allowed(loc, Direction::East));

        map.remove_boundary(loc, Direction::North);
        assert!(map.step_allowed(loc, Direction::North));
        assert!(map.step_allowed(Location::new(10, 11), Direction::South));
    }

    #[test]
    fn removal_restores_base_terrain() {
        let mut base = vec![0; (SECTOR_SIZE * SECTOR_SIZE) as usize];
        base[(10 * SECTOR_SIZE + 10) as usize] = clip::NORTH;
        let map = CollisionMap::new();
        map.insert_sector(0, 0, Sector::from_base(base));

        let loc = Location::new(10, 10);
        map.place_boundary(loc, Direction::North);
        map.remove_boundary(loc, Direction::North);

        // The terrain's own north wall survives the boundary's removal.
        assert_eq!(map.mask(loc), clip::NORTH);
    }

    #[test]
    fn diagonal_needs_clear_flanks() {
        let map = CollisionMap::new();
        let from = Location::new(20, 20);

        // Wall on the north edge forbids the north-east diagonal.
        map.place_boundary(from, Direction::North);
        assert!(!map.step_allowed(from, Direction::NorthEast));
        assert!(map.step_allowed(from, Direction::East));
    }

    #[test]
    fn footprint_blocks_fully() {
        let map = CollisionMap::new();
        map.place_footprint(Location::new(5, 5), 2, 2);
        assert!(!map.step_allowed(Location::new(5, 4), Direction::North));
        assert!(!map.step_allowed(Location::new(4, 4), Direction::NorthEast));
        map.remove_footprint(Location::new(5, 5), 2, 2);
        assert!(map.step_allowed(Location::new(5, 4), Direction::North));
    }
}
