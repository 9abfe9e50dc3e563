use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mithril_protocol::{op, Frame, FrameBuilder, FrameEncoder};
use parking_lot::{Mutex, RwLock};
use tracing::warn;

use crate::{
    ActionResult, AppearanceTable, Connection, HasStates, Inventory, Item, Location, Mobile,
    RegionView, Shop, SkillTable, States, World,
};

/// A closure run at the start of each tick until it reports done.
pub type TickAction = Box<dyn FnMut(&Arc<Player>) -> bool + Send>;

/// A deferred handler closure re-evaluated each tick until the player is in
/// range of its target or the action aborts.
pub type DistancedAction = Box<dyn FnMut(&World, &Arc<Player>) -> ActionResult + Send>;

/// The profile the store loads and saves. Everything else on a player is
/// transient.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlayerProfile {
    pub username: String,
    pub rank: u8,
    pub x: i32,
    pub y: i32,
    pub skills: Vec<(i32, i32, i64)>,
    pub appearance: Option<AppearanceTable>,
    pub inventory: Vec<Item>,
}

pub const PRAYER_COUNT: usize = 14;

/// A connected player: a mob plus its session, queues, and deferred
/// actions.
pub struct Player {
    pub index: usize,
    pub generation: u64,
    pub username: String,
    pub username_hash: u64,
    pub ip: IpAddr,
    pub rank: u8,
    pub reconnecting: bool,

    pub mobile: Mobile,
    pub skills: SkillTable,
    pub appearance: RwLock<AppearanceTable>,
    pub inventory: Inventory,
    pub states: States,
    pub running: AtomicBool,

    conn: Mutex<Option<Arc<dyn Connection>>>,
    out: Mutex<FrameEncoder>,
    tick_action: Mutex<Option<TickAction>>,
    distanced_action: Mutex<Option<DistancedAction>>,
    vars: RwLock<HashMap<String, i64>>,
    prayers: Mutex<[bool; PRAYER_COUNT]>,
    shop: Mutex<Option<Arc<Shop>>>,
    logout_requested: AtomicBool,

    // View-diff bookkeeping for the broadcast phase: what this player's
    // client has been told about, keyed to catch replacements.
    pub(crate) known_players: Mutex<HashSet<usize>>,
    pub(crate) known_npcs: Mutex<HashSet<usize>>,
    pub(crate) known_objects: Mutex<HashMap<Location, u32>>,
    pub(crate) known_boundaries: Mutex<HashMap<Location, u32>>,
    pub(crate) known_items: Mutex<HashMap<u64, (u32, Location)>>,
    pub(crate) pending_appearances: Mutex<Vec<usize>>,
    pub(crate) last_view: Mutex<Option<RegionView>>,
}

impl Player {
    pub fn new(
        index: usize,
        generation: u64,
        profile: &PlayerProfile,
        ip: IpAddr,
        reconnecting: bool,
    ) -> Self {
        let player = Self {
            index,
            generation,
            username: profile.username.clone(),
            username_hash: crate::base37(&profile.username),
            ip,
            rank: profile.rank,
            reconnecting,
            mobile: Mobile::at(Location::new(profile.x, profile.y)),
            skills: SkillTable::new(),
            appearance: RwLock::new(profile.appearance.unwrap_or_default()),
            inventory: Inventory::default(),
            states: States::new(),
            running: AtomicBool::new(false),
            conn: Mutex::new(None),
            out: Mutex::new(FrameEncoder::new()),
            tick_action: Mutex::new(None),
            distanced_action: Mutex::new(None),
            vars: RwLock::new(HashMap::new()),
            prayers: Mutex::new([false; PRAYER_COUNT]),
            shop: Mutex::new(None),
            logout_requested: AtomicBool::new(false),
            known_players: Mutex::new(HashSet::new()),
            known_npcs: Mutex::new(HashSet::new()),
            known_objects: Mutex::new(HashMap::new()),
            known_boundaries: Mutex::new(HashMap::new()),
            known_items: Mutex::new(HashMap::new()),
            pending_appearances: Mutex::new(Vec::new()),
            last_view: Mutex::new(None),
        };

        for (i, &(current, maximum, experience)) in profile.skills.iter().enumerate() {
            if let Some(skill) = crate::skills::skill_by_index(i) {
                player.skills.set_all(skill, current, maximum, experience);
            }
        }
        player.inventory.replace(profile.inventory.clone());
        player
    }

    /// Captures the persistent subset for the profile store.
    pub fn profile(&self) -> PlayerProfile {
        let loc = self.mobile.loc();
        PlayerProfile {
            username: self.username.clone(),
            rank: self.rank,
            x: loc.x,
            y: loc.y,
            skills: self.skills.snapshot(),
            appearance: Some(*self.appearance.read()),
            inventory: self.inventory.snapshot(),
        }
    }

    /// Wires up the connection actor and, when the session is ciphered,
    /// seeds the outbound opcode cipher. The inbound cipher lives in the
    /// actor's decoder.
    pub fn attach(&self, conn: Arc<dyn Connection>, cipher_seed: Option<&[u32; 4]>) {
        if let Some(seed) = cipher_seed {
            self.out.lock().enable_cipher(seed);
        }
        *self.conn.lock() = Some(conn);
    }

    pub fn connected(&self) -> bool {
        self.conn.lock().is_some()
    }

    /// Appends a frame to the outbound queue. Errors only on oversized
    /// frames, which indicates a bug in the builder, so they are logged and
    /// dropped.
    pub fn send_frame(&self, frame: &Frame) {
        if let Err(e) = self.out.lock().append_frame(frame) {
            warn!(player = %self.username, "dropping outbound frame: {e:#}");
        }
    }

    /// Sends an in-world chat message.
    pub fn message(&self, text: &str) {
        self.send_frame(&FrameBuilder::new(op::SERVER_MESSAGE).put_str(text).build());
    }

    /// Hands everything queued since the last flush to the connection
    /// actor. An error means the connection is dead.
    pub fn flush_outbound(&self) -> anyhow::Result<()> {
        let bytes = self.out.lock().take();
        if bytes.is_empty() {
            return Ok(());
        }
        match &*self.conn.lock() {
            Some(conn) => conn.try_send(bytes),
            None => Ok(()),
        }
    }

    /// Pops every frame the actor has queued since last tick, preserving
    /// send order. An error means the actor terminated.
    pub fn drain_inbound(&self) -> anyhow::Result<Vec<Frame>> {
        let conn = self.conn.lock();
        let Some(conn) = conn.as_ref() else {
            return Ok(Vec::new());
        };
        let mut frames = Vec::new();
        while let Some(frame) = conn.try_recv()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    pub fn close_connection(&self) {
        if let Some(conn) = self.conn.lock().take() {
            conn.close();
        }
    }

    pub fn set_tick_action(&self, action: TickAction) {
        *self.tick_action.lock() = Some(action);
    }

    /// Runs the player's current tick action; clears it once it reports
    /// done.
    pub fn run_tick_action(player: &Arc<Player>) {
        let mut slot = player.tick_action.lock();
        if let Some(action) = slot.as_mut() {
            if !action(player) {
                *slot = None;
            }
        }
    }

    pub fn set_distanced_action(&self, action: DistancedAction) {
        *self.distanced_action.lock() = Some(action);
    }

    pub fn clear_distanced_action(&self) {
        *self.distanced_action.lock() = None;
    }

    /// Re-evaluates the player's pending distanced action, dropping it
    /// when it completes or aborts.
    pub fn run_distanced_action(player: &Arc<Player>, world: &World) {
        let mut slot = player.distanced_action.lock();
        if let Some(action) = slot.as_mut() {
            match action(world, player) {
                ActionResult::NotReady => {}
                ActionResult::Completed | ActionResult::Aborted => *slot = None,
            }
        }
    }

    pub fn walk_to(&self, target: Location) {
        self.mobile.set_path(crate::Path::to(target));
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn var(&self, name: &str) -> Option<i64> {
        self.vars.read().get(name).copied()
    }

    pub fn var_or(&self, name: &str, default: i64) -> i64 {
        self.var(name).unwrap_or(default)
    }

    pub fn set_var(&self, name: &str, value: i64) {
        self.vars.write().insert(name.to_owned(), value);
    }

    pub fn prayer_active(&self, index: usize) -> bool {
        self.prayers.lock().get(index).copied().unwrap_or(false)
    }

    pub fn set_prayer(&self, index: usize, active: bool) {
        if let Some(slot) = self.prayers.lock().get_mut(index) {
            *slot = active;
        }
    }

    /// The prayer status frame: one byte per prayer.
    pub fn prayer_frame(&self) -> Frame {
        let prayers = self.prayers.lock();
        let mut builder = FrameBuilder::new(op::PRAYER_STATUS);
        for &active in prayers.iter() {
            builder = builder.put_u8(u8::from(active));
        }
        builder.build()
    }

    pub fn open_shop(&self, shop: Arc<Shop>) {
        self.states.add(crate::state::SHOPPING);
        *self.shop.lock() = Some(shop);
    }

    pub fn current_shop(&self) -> Option<Arc<Shop>> {
        self.shop.lock().clone()
    }

    pub fn close_shop(&self) {
        *self.shop.lock() = None;
        self.states.remove(crate::state::SHOPPING);
        self.send_frame(&FrameBuilder::new(op::SHOP_CLOSE).build());
    }

    pub fn request_logout(&self) {
        self.logout_requested.store(true, Ordering::SeqCst);
    }

    pub fn logout_requested(&self) -> bool {
        self.logout_requested.load(Ordering::SeqCst)
    }

    pub fn busy(&self) -> bool {
        self.states.busy()
    }
}

impl HasStates for Player {
    fn states(&self) -> &States {
        &self.states
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::state;

    pub(crate) fn test_profile(name: &str, x: i32, y: i32) -> PlayerProfile {
        PlayerProfile {
            username: name.to_owned(),
            x,
            y,
            ..PlayerProfile::default()
        }
    }

    fn test_player() -> Arc<Player> {
        Arc::new(Player::new(
            0,
            1,
            &test_profile("alice", 50, 50),
            Ipv4Addr::LOCALHOST.into(),
            false,
        ))
    }

    #[test]
    fn tick_action_clears_when_done() {
        let player = test_player();
        let mut remaining = 2;
        player.set_tick_action(Box::new(move |_| {
            remaining -= 1;
            remaining > 0
        }));

        Player::run_tick_action(&player);
        assert!(player.tick_action.lock().is_some());
        Player::run_tick_action(&player);
        assert!(player.tick_action.lock().is_none());
    }

    #[test]
    fn shop_state_follows_shop_view() {
        let player = test_player();
        let shop = Arc::new(Shop::new("General Store", [(1, 3)], 130, 40));

        player.open_shop(shop);
        assert!(player.states.has(state::SHOPPING));

        player.close_shop();
        assert!(!player.states.has(state::SHOPPING));
        assert!(player.current_shop().is_none());
    }

    #[test]
    fn profile_round_trips_inventory() {
        let player = test_player();
        player.inventory.replace(vec![Item { id: 995, amount: 42 }]);

        let profile = player.profile();
        assert_eq!(profile.inventory, vec![Item { id: 995, amount: 42 }]);
        assert_eq!(profile.x, 50);
    }
}
