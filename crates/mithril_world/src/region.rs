use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{GroundItem, Location};

/// Tiles per region side. A region is the view-culling window; a player
/// sees the 3x3 block of regions around their own.
pub const REGION_SIZE: i32 = 48;

/// A region's grid coordinate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
pub struct RegionCoord {
    pub x: i32,
    pub y: i32,
}

impl RegionCoord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn containing(loc: Location) -> Self {
        Self {
            x: loc.x.div_euclid(REGION_SIZE),
            y: loc.y.div_euclid(REGION_SIZE),
        }
    }
}

/// The 3x3 block of regions centered on a viewer.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct RegionView {
    pub center: RegionCoord,
}

impl RegionView {
    pub fn of(loc: Location) -> Self {
        Self {
            center: RegionCoord::containing(loc),
        }
    }

    #[inline]
    pub fn contains(self, coord: RegionCoord) -> bool {
        (coord.x - self.center.x).abs() <= 1 && (coord.y - self.center.y).abs() <= 1
    }

    pub fn contains_tile(self, loc: Location) -> bool {
        self.contains(RegionCoord::containing(loc))
    }

    /// Returns an iterator over the nine region coordinates in this view.
    pub fn iter(self) -> impl Iterator<Item = RegionCoord> {
        (self.center.y - 1..=self.center.y + 1).flat_map(move |y| {
            (self.center.x - 1..=self.center.x + 1).map(move |x| RegionCoord { x, y })
        })
    }

    /// Regions in this view but not in `other`.
    pub fn diff(self, other: Self) -> impl Iterator<Item = RegionCoord> {
        self.iter().filter(move |&c| !other.contains(c))
    }
}

/// Per-region entity lists, used for fast view enumeration.
#[derive(Default)]
pub(crate) struct Region {
    pub(crate) players: RwLock<Vec<usize>>,
    pub(crate) npcs: RwLock<Vec<usize>>,
    pub(crate) items: RwLock<Vec<Arc<GroundItem>>>,
}

/// The region grid. Regions materialize on first use.
#[derive(Default)]
pub(crate) struct RegionIndex {
    regions: RwLock<HashMap<RegionCoord, Arc<Region>>>,
}

impl RegionIndex {
    pub(crate) fn get(&self, coord: RegionCoord) -> Arc<Region> {
        if let Some(region) = self.regions.read().get(&coord) {
            return region.clone();
        }
        self.regions.write().entry(coord).or_default().clone()
    }

    pub(crate) fn try_get(&self, coord: RegionCoord) -> Option<Arc<Region>> {
        self.regions.read().get(&coord).cloned()
    }

    /// Snapshot of entity indexes of one kind across a view.
    pub(crate) fn collect(
        &self,
        view: RegionView,
        pick: impl Fn(&Region) -> Vec<usize>,
    ) -> Vec<usize> {
        let mut out = Vec::new();
        for coord in view.iter() {
            if let Some(region) = self.try_get(coord) {
                out.extend(pick(&region));
            }
        }
        out
    }
}

fn remove_index(list: &RwLock<Vec<usize>>, index: usize) {
    let mut list = list.write();
    if let Some(pos) = list.iter().position(|&i| i == index) {
        list.swap_remove(pos);
    }
}

impl Region {
    pub(crate) fn add_player(&self, index: usize) {
        self.players.write().push(index);
    }

    pub(crate) fn remove_player(&self, index: usize) {
        remove_index(&self.players, index);
    }

    pub(crate) fn add_npc(&self, index: usize) {
        self.npcs.write().push(index);
    }

    pub(crate) fn remove_npc(&self, index: usize) {
        remove_index(&self.npcs, index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_is_three_by_three() {
        let view = RegionView::of(Location::new(100, 100));
        assert_eq!(view.iter().count(), 9);
        assert!(view.contains(RegionCoord::new(1, 1)));
        assert!(view.contains(RegionCoord::new(3, 3)));
        assert!(!view.contains(RegionCoord::new(4, 2)));
    }

    #[test]
    fn diff_yields_left_regions() {
        let old = RegionView::of(Location::new(100, 100));
        let new = RegionView::of(Location::new(148, 100));

        let dropped: Vec<_> = old.diff(new).collect();
        assert_eq!(dropped.len(), 3);
        assert!(dropped.iter().all(|c| c.x == 1));
    }

    #[test]
    fn membership_moves_between_regions() {
        let index = RegionIndex::default();
        let a = RegionCoord::new(0, 0);
        let b = RegionCoord::new(1, 0);

        index.get(a).add_player(7);
        assert_eq!(index.get(a).players.read().len(), 1);

        index.get(a).remove_player(7);
        index.get(b).add_player(7);
        assert!(index.get(a).players.read().is_empty());
        assert_eq!(index.get(b).players.read().as_slice(), &[7]);
    }
}
