//! The tick engine: one global 640 ms cadence advancing all world state.
//!
//! Each tick runs seven phases in order, none overlapping the next:
//! login intake, per-player advance, NPC advance, scripted hooks,
//! broadcast, reset, logout drain. Per-player and per-NPC work inside a
//! phase fans out on the rayon pool and joins before the next phase
//! starts. Missed ticks are dropped, never queued; overruns are logged and
//! left uncorrected.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use flume::Receiver;
use mithril_network::IncomingPlayer;
use mithril_world::store::PlayerStore;
use mithril_world::{state, sync, Player, RegionView, World};
use rand::Rng;
use rayon::prelude::*;
use tokio::runtime::Handle;
use tracing::{error, info, warn};

use crate::handlers::{HandlerContext, HandlerTable};
use crate::outgoing;

/// The global tick period.
pub const TICK: Duration = Duration::from_millis(640);

/// Login and logout queues each drain at most this many entries per tick.
pub const DRAIN_LIMIT: usize = 25;

/// An opaque per-tick callback from the scripting host.
pub type TickHook = Box<dyn Fn(&World) + Send + Sync>;

pub struct Engine {
    world: Arc<World>,
    handlers: HandlerTable,
    ctx: HandlerContext,
    login_rx: Receiver<IncomingPlayer>,
    store: Arc<dyn PlayerStore>,
    tokio: Handle,
    hooks: Vec<TickHook>,
    shutdown: Arc<AtomicBool>,
}

impl Engine {
    pub fn new(
        world: Arc<World>,
        handlers: HandlerTable,
        login_rx: Receiver<IncomingPlayer>,
        store: Arc<dyn PlayerStore>,
        tokio: Handle,
    ) -> Self {
        Self {
            ctx: HandlerContext {
                world: world.clone(),
                tokio: tokio.clone(),
            },
            world,
            handlers,
            login_rx,
            store,
            tokio,
            hooks: Vec::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Registers a scripting-host callback run every tick in phase 4.
    pub fn add_tick_hook(&mut self, hook: TickHook) {
        self.hooks.push(hook);
    }

    /// A handle that stops the engine at its next tick boundary.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Runs the tick loop on the calling thread until shutdown, then drains
    /// every remaining player through persistence.
    pub fn run(self) {
        info!(period = ?TICK, "tick engine running");
        let mut next = Instant::now() + TICK;

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                self.drain_all_players();
                info!("tick engine stopped");
                return;
            }

            let now = Instant::now();
            if now < next {
                std::thread::sleep(next - now);
            }

            let started = Instant::now();
            self.run_tick();
            let elapsed = started.elapsed();
            if elapsed > TICK {
                warn!(?elapsed, "tick overran its period");
            }

            next += TICK;
            let now = Instant::now();
            if now > next {
                // Behind by whole periods: drop them rather than queueing
                // catch-up ticks.
                let mut dropped = 0_u32;
                while next < now {
                    next += TICK;
                    dropped += 1;
                }
                warn!(dropped, "dropped missed ticks");
            }
        }
    }

    /// One full tick, phases in order.
    pub fn run_tick(&self) {
        self.world.advance_tick();

        self.intake_logins();
        self.player_phase();
        self.npc_phase();
        self.world.tick_respawns();

        for hook in &self.hooks {
            hook(&self.world);
        }

        {
            // Broadcast and reset run under the giant lock so trigger tasks
            // finishing mid-broadcast cannot slip state changes between the
            // snapshot and the flag reset.
            let _giant = self.world.giant().lock();
            self.broadcast_phase();
            self.reset_phase();
        }

        self.logout_phase();
    }

    /// Phase 1: drain up to 25 accepted logins, register them, and send
    /// the welcome sequence.
    fn intake_logins(&self) {
        for _ in 0..DRAIN_LIMIT {
            let Ok(incoming) = self.login_rx.try_recv() else {
                break;
            };

            let player = self.world.register_player(
                &incoming.profile,
                incoming.ip,
                incoming.reconnecting,
            );
            player.attach(incoming.conn, incoming.cipher_seed.as_ref());

            player.send_frame(&outgoing::welcome(&player));
            player.send_frame(&outgoing::stats(&player));
            player.send_frame(&outgoing::inventory(&player));
            player.message("Welcome to the world");
        }
    }

    /// Phase 2: per player, in parallel: drain and dispatch inbound
    /// frames, run deferred actions, advance the path.
    fn player_phase(&self) {
        let players = self.world.players.snapshot();
        players.par_iter().for_each(|player| {
            match player.drain_inbound() {
                Ok(frames) => {
                    for frame in frames {
                        self.handlers.dispatch(&self.ctx, player, &frame);
                    }
                }
                Err(_) => player.request_logout(),
            }

            Player::run_tick_action(player);
            Player::run_distanced_action(player, &self.world);
            self.world.traverse_player(player);
        });
    }

    /// Phase 3: NPC advance: aggression first, wandering otherwise.
    fn npc_phase(&self) {
        let world = &self.world;
        let npcs = world.npcs.snapshot();
        npcs.par_iter().for_each(|npc| {
            if npc.busy() || npc.states.has(state::FIGHTING) {
                return;
            }

            if npc.aggressive(&world.defs) {
                match npc.target().and_then(|r| world.players.deref(r)) {
                    Some(target) => {
                        let target_at = target.mobile.loc();
                        if RegionView::of(npc.mobile.loc()).contains_tile(target_at) {
                            world.step_npc_toward(npc, target_at);
                        } else {
                            // Target left the area; drop the weak ref.
                            npc.clear_target();
                        }
                    }
                    None => {
                        npc.clear_target();
                        if let Some(player) = world.closest_player_to(npc.mobile.loc()) {
                            npc.acquire_target(world.player_ref(&player));
                            world.step_npc_toward(npc, player.mobile.loc());
                        }
                    }
                }
                return;
            }

            let mut rng = rand::thread_rng();
            if npc.wander_idle() && rng.gen_ratio(1, 25) {
                npc.begin_wander(rng.gen_range(2..=14), rng.gen_range(25..=35));
            }
            if let Some((from, to)) = npc.advance_wander(&world.collision) {
                world.on_npc_moved(npc.index, from, to);
            }
        });
    }

    /// Phase 5: per player, in parallel, compute and enqueue the diff
    /// frames in the protocol's fixed order.
    fn broadcast_phase(&self) {
        let players = self.world.players.snapshot();
        players
            .par_iter()
            .for_each(|player| sync::enqueue_updates(&self.world, player));
    }

    /// Phase 6: clear every per-tick dirty flag, then hand each player's
    /// queued frames to their connection actor.
    fn reset_phase(&self) {
        let players = self.world.players.snapshot();
        players.par_iter().for_each(|player| {
            player.mobile.reset_dirty();
            if player.flush_outbound().is_err() {
                player.request_logout();
            }
        });

        let npcs = self.world.npcs.snapshot();
        npcs.par_iter().for_each(|npc| npc.mobile.reset_dirty());

        self.world.clear_npc_events();
    }

    /// Phase 7: drain up to 25 logouts: persist, remove from the world,
    /// close the connection.
    fn logout_phase(&self) {
        let leaving: Vec<_> = self
            .world
            .players
            .snapshot()
            .into_iter()
            .filter(|p| p.logout_requested())
            .take(DRAIN_LIMIT)
            .collect();

        for player in leaving {
            let profile = player.profile();
            if let Err(e) = self.tokio.block_on(self.store.save(&profile)) {
                error!(player = %player.username, "failed to persist profile: {e:#}");
            }
            self.world.unregister_player(&player);
            player.close_connection();
            info!(player = %player.username, "logged out");
        }
    }

    /// Shutdown path: everyone still online is persisted and removed,
    /// ignoring the per-tick drain limit.
    fn drain_all_players(&self) {
        for player in self.world.players.snapshot() {
            player.request_logout();
        }
        while !self.world.players.is_empty() {
            self.logout_phase();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::BytesMut;
    use mithril_network::ResponseCode;
    use mithril_protocol::Frame;
    use mithril_world::{Connection, Definitions, Item, PlayerProfile};

    use super::*;
    use crate::config::default_opcode_table;

    struct NullConn;

    impl Connection for NullConn {
        fn try_send(&self, _bytes: BytesMut) -> anyhow::Result<()> {
            Ok(())
        }

        fn try_recv(&self) -> anyhow::Result<Option<Frame>> {
            Ok(None)
        }

        fn close(&self) {}
    }

    #[derive(Default)]
    struct MemStore {
        profiles: Mutex<HashMap<String, PlayerProfile>>,
    }

    #[async_trait]
    impl PlayerStore for MemStore {
        async fn name_exists(&self, username: &str) -> bool {
            self.profiles.lock().unwrap().contains_key(username)
        }

        async fn valid_login(&self, _name_hash: u64, _password_hash: &str) -> bool {
            true
        }

        async fn load(&self, username: &str) -> Option<PlayerProfile> {
            self.profiles.lock().unwrap().get(username).cloned()
        }

        async fn save(&self, profile: &PlayerProfile) -> anyhow::Result<()> {
            self.profiles
                .lock()
                .unwrap()
                .insert(profile.username.clone(), profile.clone());
            Ok(())
        }
    }

    struct Fixture {
        engine: Engine,
        login_tx: flume::Sender<IncomingPlayer>,
        store: Arc<MemStore>,
        _runtime: tokio::runtime::Runtime,
    }

    fn fixture() -> Fixture {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let world = Arc::new(World::new(Arc::new(Definitions::default())));
        let store = Arc::new(MemStore::default());
        let (login_tx, login_rx) = flume::bounded(64);

        let engine = Engine::new(
            world,
            HandlerTable::new(&default_opcode_table()),
            login_rx,
            store.clone(),
            runtime.handle().clone(),
        );
        Fixture {
            engine,
            login_tx,
            store,
            _runtime: runtime,
        }
    }

    fn incoming(name: &str) -> IncomingPlayer {
        IncomingPlayer {
            profile: PlayerProfile {
                username: name.to_owned(),
                x: 100,
                y: 100,
                ..PlayerProfile::default()
            },
            ip: [127, 0, 0, 1].into(),
            reconnecting: false,
            code: ResponseCode::Success,
            conn: Arc::new(NullConn),
            cipher_seed: None,
        }
    }

    #[test]
    fn login_intake_caps_at_twenty_five() {
        let f = fixture();
        for i in 0..30 {
            f.login_tx.send(incoming(&format!("player{i}"))).unwrap();
        }

        f.engine.run_tick();
        assert_eq!(f.engine.world.players.len(), DRAIN_LIMIT);

        f.engine.run_tick();
        assert_eq!(f.engine.world.players.len(), 30);
    }

    #[test]
    fn logout_persists_by_next_tick() {
        let f = fixture();
        f.login_tx.send(incoming("alice")).unwrap();
        f.engine.run_tick();

        let player = f.engine.world.players.get(0).unwrap();
        player
            .inventory
            .replace(vec![Item { id: 995, amount: 42 }]);
        player.request_logout();

        f.engine.run_tick();
        assert!(f.engine.world.players.is_empty());

        let saved = f
            .store
            .profiles
            .lock()
            .unwrap()
            .get("alice")
            .cloned()
            .unwrap();
        assert_eq!(saved.inventory, vec![Item { id: 995, amount: 42 }]);
    }

    #[test]
    fn dirty_flags_clear_every_tick() {
        let f = fixture();
        f.login_tx.send(incoming("alice")).unwrap();
        f.engine.run_tick();

        let player = f.engine.world.players.get(0).unwrap();
        player.walk_to(mithril_world::Location::new(103, 100));

        f.engine.run_tick();
        assert!(!player.mobile.is_dirty(mithril_world::dirty::ALL));
    }

    #[test]
    fn wandering_npc_respects_cooldown() {
        let f = fixture();
        let npc = f.engine.world.add_npc(
            0,
            mithril_world::Location::new(12, 12),
            mithril_world::Location::new(10, 10),
            mithril_world::Location::new(14, 14),
        );

        npc.begin_wander(5, 30);
        for _ in 0..5 {
            f.engine.run_tick();
        }
        assert_eq!(npc.steps(), 0);
        assert_eq!(npc.ticks(), 25);
    }

    #[test]
    fn shutdown_drains_everyone() {
        let f = fixture();
        for i in 0..30 {
            f.login_tx.send(incoming(&format!("p{i}"))).unwrap();
        }
        f.engine.run_tick();
        f.engine.run_tick();
        assert_eq!(f.engine.world.players.len(), 30);

        f.engine.drain_all_players();
        assert!(f.engine.world.players.is_empty());
        assert_eq!(f.store.profiles.lock().unwrap().len(), 30);
    }
}
