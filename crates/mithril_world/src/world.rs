use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use tracing::debug;

use crate::path::step_toward;
use crate::region::RegionIndex;
use crate::triggers::Triggers;
use crate::{
    CollisionMap, Definitions, GroundItem, Location, MobRef, Npc, Object, Player, PlayerProfile,
    RegionCoord, RegionView, Registry,
};

/// Aggro radius for aggressive NPCs, in tiles (squared euclidean).
const AGGRO_RANGE_SQ: i64 = 64;

/// An event attached to an NPC for one tick, broadcast to viewers and
/// cleared in the reset phase.
#[derive(Clone, Debug)]
pub struct NpcEvent {
    pub npc_index: usize,
    pub kind: u8,
    pub value: i32,
}

struct PendingRespawn {
    item: GroundItem,
    remaining: u32,
}

/// The world: collision masks, spatial indices, and the registries of
/// everything alive on the grid. Definitions are immutable and injected at
/// construction.
pub struct World {
    pub defs: Arc<Definitions>,
    pub collision: CollisionMap,
    pub players: Registry<Player>,
    pub npcs: Registry<Npc>,
    pub triggers: Triggers,

    scenery: RwLock<HashMap<Location, Arc<Object>>>,
    boundaries: RwLock<HashMap<Location, Arc<Object>>>,
    regions: RegionIndex,

    item_seq: AtomicU64,
    respawns: Mutex<Vec<PendingRespawn>>,
    npc_events: Mutex<Vec<NpcEvent>>,

    current_tick: AtomicU64,
    update_in_progress: AtomicBool,
    /// Serializes the broadcast/reset window against trigger-action tasks
    /// finishing mid-broadcast.
    giant: Mutex<()>,
}

impl World {
    pub fn new(defs: Arc<Definitions>) -> Self {
        Self::with_parts(defs, CollisionMap::new(), Triggers::default())
    }

    pub fn with_collision(defs: Arc<Definitions>, collision: CollisionMap) -> Self {
        Self::with_parts(defs, collision, Triggers::default())
    }

    /// Assembles a world from loaded collision data and the trigger tables
    /// the scripting host registered.
    pub fn with_parts(defs: Arc<Definitions>, collision: CollisionMap, triggers: Triggers) -> Self {
        Self {
            defs,
            collision,
            players: Registry::new(),
            npcs: Registry::new(),
            triggers,
            scenery: RwLock::new(HashMap::new()),
            boundaries: RwLock::new(HashMap::new()),
            regions: RegionIndex::default(),
            item_seq: AtomicU64::new(1),
            respawns: Mutex::new(Vec::new()),
            npc_events: Mutex::new(Vec::new()),
            current_tick: AtomicU64::new(0),
            update_in_progress: AtomicBool::new(false),
            giant: Mutex::new(()),
        }
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick.load(Ordering::SeqCst)
    }

    pub fn advance_tick(&self) -> u64 {
        self.current_tick.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn update_in_progress(&self) -> bool {
        self.update_in_progress.load(Ordering::SeqCst)
    }

    pub fn set_update_in_progress(&self, value: bool) {
        self.update_in_progress.store(value, Ordering::SeqCst);
    }

    /// The lock held across the broadcast and reset phases.
    pub fn giant(&self) -> &Mutex<()> {
        &self.giant
    }

    /// Rolls a 1-in-`n` chance on the world RNG.
    pub fn chance(&self, n: u32) -> bool {
        rand::thread_rng().gen_ratio(1, n)
    }

    // ---- objects ----

    /// Places an object, enforcing at most one per `(x, y, boundary)` and
    /// applying its collision contribution.
    pub fn add_object(&self, object: Object) -> Result<Arc<Object>> {
        let map = if object.boundary {
            &self.boundaries
        } else {
            &self.scenery
        };

        let mut map = map.write();
        if map.contains_key(&object.loc) {
            bail!(
                "an object already occupies ({}, {}, boundary={})",
                object.loc.x,
                object.loc.y,
                object.boundary
            );
        }

        if object.boundary {
            self.collision.place_boundary(object.loc, object.boundary_edge());
        } else {
            let (w, h) = object.footprint(&self.defs);
            if self.defs.object(object.id).map_or(true, |d| d.solid()) {
                self.collision.place_footprint(object.loc, w, h);
            }
        }

        let object = Arc::new(object);
        map.insert(object.loc, object.clone());
        Ok(object)
    }

    /// Removes an object if it is still the live occupant, restoring the
    /// terrain mask under it.
    pub fn remove_object(&self, object: &Arc<Object>) -> bool {
        let map = if object.boundary {
            &self.boundaries
        } else {
            &self.scenery
        };

        let mut map = map.write();
        let Some(live) = map.get(&object.loc) else {
            return false;
        };
        if !Arc::ptr_eq(live, object) {
            return false;
        }
        map.remove(&object.loc);
        drop(map);

        if object.boundary {
            self.collision.remove_boundary(object.loc, object.boundary_edge());
        } else {
            let (w, h) = object.footprint(&self.defs);
            if self.defs.object(object.id).map_or(true, |d| d.solid()) {
                self.collision.remove_footprint(object.loc, w, h);
            }
        }
        true
    }

    pub fn scenery_at(&self, loc: Location) -> Option<Arc<Object>> {
        self.scenery.read().get(&loc).cloned()
    }

    pub fn boundary_at(&self, loc: Location) -> Option<Arc<Object>> {
        self.boundaries.read().get(&loc).cloned()
    }

    /// The object at a tile, scenery first. Handlers check the `boundary`
    /// flag against the kind they expect.
    pub fn object_at(&self, loc: Location) -> Option<Arc<Object>> {
        self.scenery_at(loc).or_else(|| self.boundary_at(loc))
    }

    pub fn all_scenery(&self) -> Vec<Arc<Object>> {
        self.scenery.read().values().cloned().collect()
    }

    pub fn all_boundaries(&self) -> Vec<Arc<Object>> {
        self.boundaries.read().values().cloned().collect()
    }

    // ---- ground items ----

    pub fn add_item(
        &self,
        id: u32,
        amount: u32,
        loc: Location,
        owner: Option<u64>,
        respawn: Option<u32>,
    ) -> Arc<GroundItem> {
        let item = Arc::new(GroundItem {
            seq: self.item_seq.fetch_add(1, Ordering::SeqCst),
            id,
            amount,
            loc,
            owner,
            spawn_tick: self.current_tick(),
            respawn,
        });
        self.regions
            .get(RegionCoord::containing(loc))
            .items
            .write()
            .push(item.clone());
        item
    }

    /// Removes a ground item; persistent spawners re-emit after their
    /// period.
    pub fn remove_item(&self, item: &Arc<GroundItem>) -> bool {
        let region = self.regions.get(RegionCoord::containing(item.loc));
        let mut items = region.items.write();
        let Some(pos) = items.iter().position(|i| Arc::ptr_eq(i, item)) else {
            return false;
        };
        items.swap_remove(pos);
        drop(items);

        if let Some(period) = item.respawn {
            self.respawns.lock().push(PendingRespawn {
                item: GroundItem {
                    owner: None,
                    ..(**item).clone()
                },
                remaining: period,
            });
        }
        true
    }

    /// Runs respawn timers one tick forward, re-adding expired spawners.
    pub fn tick_respawns(&self) {
        let mut due = Vec::new();
        {
            let mut respawns = self.respawns.lock();
            respawns.retain_mut(|pending| {
                if pending.remaining <= 1 {
                    due.push(pending.item.clone());
                    false
                } else {
                    pending.remaining -= 1;
                    true
                }
            });
        }
        for item in due {
            self.add_item(item.id, item.amount, item.loc, None, item.respawn);
        }
    }

    pub fn items_in_view(&self, view: RegionView) -> Vec<Arc<GroundItem>> {
        let mut out = Vec::new();
        for coord in view.iter() {
            if let Some(region) = self.regions.try_get(coord) {
                out.extend(region.items.read().iter().cloned());
            }
        }
        out
    }

    pub fn item_at(&self, loc: Location, id: u32) -> Option<Arc<GroundItem>> {
        let region = self.regions.try_get(RegionCoord::containing(loc))?;
        let items = region.items.read();
        items
            .iter()
            .find(|i| i.loc == loc && i.id == id)
            .cloned()
    }

    // ---- players ----

    /// Creates and registers a player. Runs in the tick's login-intake
    /// phase.
    pub fn register_player(
        &self,
        profile: &PlayerProfile,
        ip: IpAddr,
        reconnecting: bool,
    ) -> Arc<Player> {
        let player = self
            .players
            .insert_with(|index, generation| {
                Player::new(index, generation, profile, ip, reconnecting)
            });
        self.regions
            .get(RegionCoord::containing(player.mobile.loc()))
            .add_player(player.index);
        debug!(player = %player.username, index = player.index, "registered");
        player
    }

    /// Removes a player from the world. Transient chat/shop state dies with
    /// the session.
    pub fn unregister_player(&self, player: &Arc<Player>) {
        self.regions
            .get(RegionCoord::containing(player.mobile.loc()))
            .remove_player(player.index);
        player.states.clear();
        player.mobile.mark(crate::dirty::REGION_REMOVED);
        self.players.remove(player.index);
    }

    pub fn player_ref(&self, player: &Player) -> MobRef {
        MobRef {
            index: player.index,
            generation: player.generation,
        }
    }

    pub fn player_by_hash(&self, hash: u64) -> Option<Arc<Player>> {
        self.players.find(|p| p.username_hash == hash)
    }

    pub fn players_in_view(&self, view: RegionView) -> Vec<Arc<Player>> {
        self.regions
            .collect(view, |region| region.players.read().clone())
            .into_iter()
            .filter_map(|index| self.players.get(index))
            .collect()
    }

    // ---- npcs ----

    /// Creates an NPC from a spawn record. Runs at world load only.
    pub fn add_npc(&self, id: u32, spawn: Location, min: Location, max: Location) -> Arc<Npc> {
        let npc = self.npcs.insert_with(|index, generation| {
            Npc::new(index, generation, id, spawn, min, max, &self.defs)
        });
        self.regions
            .get(RegionCoord::containing(spawn))
            .add_npc(npc.index);
        npc
    }

    pub fn npcs_in_view(&self, view: RegionView) -> Vec<Arc<Npc>> {
        self.regions
            .collect(view, |region| region.npcs.read().clone())
            .into_iter()
            .filter_map(|index| self.npcs.get(index))
            .collect()
    }

    /// The nearest player within aggro range of `loc`, if any.
    pub fn closest_player_to(&self, loc: Location) -> Option<Arc<Player>> {
        let mut best: Option<(i64, Arc<Player>)> = None;
        for player in self.players_in_view(RegionView::of(loc)) {
            let d = loc.euclidean_sq(player.mobile.loc());
            if d < AGGRO_RANGE_SQ && best.as_ref().map_or(true, |(bd, _)| d < *bd) {
                best = Some((d, player));
            }
        }
        best.map(|(_, p)| p)
    }

    // ---- movement ----

    /// Region bookkeeping after a mob stepped from `from` to `to`.
    fn shift_membership(
        &self,
        from: Location,
        to: Location,
        add: impl Fn(&crate::region::Region),
        remove: impl Fn(&crate::region::Region),
    ) {
        let old = RegionCoord::containing(from);
        let new = RegionCoord::containing(to);
        if old != new {
            remove(self.regions.get(old).as_ref());
            add(self.regions.get(new).as_ref());
        }
    }

    pub fn on_player_moved(&self, index: usize, from: Location, to: Location) {
        self.shift_membership(
            from,
            to,
            |r| r.add_player(index),
            |r| r.remove_player(index),
        );
    }

    pub fn on_npc_moved(&self, index: usize, from: Location, to: Location) {
        self.shift_membership(from, to, |r| r.add_npc(index), |r| r.remove_npc(index));
    }

    /// Advances a player along their path: one step, two when running.
    pub fn traverse_player(&self, player: &Arc<Player>) {
        let steps = if player.is_running() { 2 } else { 1 };
        for _ in 0..steps {
            match player.mobile.advance(&self.collision) {
                Some((from, to)) => self.on_player_moved(player.index, from, to),
                None => break,
            }
        }
    }

    /// Steps an NPC one tile toward a target tile, if a legal step exists.
    pub fn step_npc_toward(&self, npc: &Arc<Npc>, target: Location) -> bool {
        let from = npc.mobile.loc();
        let Some(to) = step_toward(&self.collision, from, target) else {
            return false;
        };
        npc.mobile.set_loc(to);
        npc.mobile.set_direction(from.direction_to(to));
        self.on_npc_moved(npc.index, from, to);
        true
    }

    /// Relocates an NPC outright (the talk-to displacement).
    pub fn displace_npc(&self, npc: &Arc<Npc>, to: Location) {
        let from = npc.mobile.set_loc(to);
        self.on_npc_moved(npc.index, from, to);
    }

    /// True when `from` and `to` are the same tile or one legal step apart.
    pub fn next_to(&self, from: Location, to: Location) -> bool {
        if from == to {
            return true;
        }
        if from.chebyshev(to) > 1 {
            return false;
        }
        self.collision.step_allowed(from, from.direction_to(to))
    }

    /// First unblocked cell adjacent to `around`, scanned in the fixed
    /// order (-1,-1), (-1,0), (-1,1), (0,-1), (0,1), (1,-1), (1,0), (1,1).
    pub fn first_open_adjacent(&self, around: Location) -> Option<Location> {
        const SCAN: [(i32, i32); 8] = [
            (-1, -1),
            (-1, 0),
            (-1, 1),
            (0, -1),
            (0, 1),
            (1, -1),
            (1, 0),
            (1, 1),
        ];
        for (dx, dy) in SCAN {
            let cell = around.translate(dx, dy);
            if self
                .collision
                .step_allowed(around, around.direction_to(cell))
            {
                return Some(cell);
            }
        }
        None
    }

    // ---- npc events ----

    pub fn push_npc_event(&self, event: NpcEvent) {
        self.npc_events.lock().push(event);
    }

    pub fn npc_events_snapshot(&self) -> Vec<NpcEvent> {
        self.npc_events.lock().clone()
    }

    pub fn clear_npc_events(&self) {
        self.npc_events.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clip, Direction};

    fn world() -> World {
        World::new(Arc::new(Definitions::default()))
    }

    fn profile(name: &str, x: i32, y: i32) -> PlayerProfile {
        PlayerProfile {
            username: name.to_owned(),
            x,
            y,
            ..PlayerProfile::default()
        }
    }

    #[test]
    fn one_object_per_tile_and_kind() {
        let w = world();
        let loc = Location::new(5, 5);

        w.add_object(Object::new(1, 0, loc, false)).unwrap();
        assert!(w.add_object(Object::new(2, 0, loc, false)).is_err());
        // A boundary may share the tile with scenery.
        w.add_object(Object::new(3, 0, loc, true)).unwrap();
    }

    #[test]
    fn boundary_objects_move_collision() {
        let w = world();
        let loc = Location::new(8, 8);

        let door = w.add_object(Object::new(1, 0, loc, true)).unwrap();
        assert!(w.collision.mask(loc) & clip::NORTH != 0);

        assert!(w.remove_object(&door));
        assert_eq!(w.collision.mask(loc), 0);
    }

    #[test]
    fn region_membership_follows_steps() {
        let w = world();
        let player = w.register_player(&profile("alice", 47, 10), [127, 0, 0, 1].into(), false);

        // One step east crosses the region boundary at x = 48.
        player.walk_to(Location::new(48, 10));
        w.traverse_player(&player);

        let here = w.players_in_view(RegionView::of(Location::new(48, 10)));
        assert_eq!(here.len(), 1);
        assert_eq!(
            w.regions
                .try_get(RegionCoord::new(0, 0))
                .map_or(0, |r| r.players.read().len()),
            0
        );
    }

    #[test]
    fn stale_npc_target_does_not_resolve() {
        let w = world();
        let npc = w.add_npc(0, Location::new(3, 3), Location::new(0, 0), Location::new(6, 6));
        let player = w.register_player(&profile("bob", 4, 3), [127, 0, 0, 1].into(), false);

        npc.acquire_target(w.player_ref(&player));
        assert!(w.players.deref(npc.target().unwrap()).is_some());

        w.unregister_player(&player);
        assert!(w.players.deref(npc.target().unwrap()).is_none());
    }

    #[test]
    fn respawning_item_returns_after_period() {
        let w = world();
        let loc = Location::new(20, 20);
        let item = w.add_item(995, 1, loc, None, Some(3));

        assert!(w.remove_item(&item));
        assert!(w.item_at(loc, 995).is_none());

        w.tick_respawns();
        w.tick_respawns();
        assert!(w.item_at(loc, 995).is_none());
        w.tick_respawns();
        assert!(w.item_at(loc, 995).is_some());
    }

    #[test]
    fn displacement_prefers_scan_order() {
        let w = world();
        let at = Location::new(10, 10);
        assert_eq!(w.first_open_adjacent(at), Some(Location::new(9, 9)));

        // Wall off the south-west diagonal's flanks.
        w.collision.place_boundary(at, Direction::West);
        assert_eq!(w.first_open_adjacent(at), Some(Location::new(10, 9)));
    }
}
