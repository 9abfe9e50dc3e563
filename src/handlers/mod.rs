//! The inbound packet dispatcher: one handler per opcode name, bound to
//! wire opcodes by the packet table in the configuration.
//!
//! Handler families:
//! - *immediate* handlers validate and mutate synchronously (prayer, shop,
//!   walking);
//! - *distanced* handlers install a deferred action re-evaluated each tick
//!   until the player reaches the target (scene interactions).
//!
//! Input validation failures are protocol violations, not errors: they log
//! to the `suspicious` channel and drop the frame, keeping the connection.

mod prayer;
mod scene;
mod shops;

use std::collections::HashMap;
use std::sync::Arc;

use mithril_protocol::Frame;
use mithril_world::{Location, Player, World};
use tokio::runtime::Handle;
use tracing::warn;

/// Everything a handler may touch besides the player itself.
pub struct HandlerContext {
    pub world: Arc<World>,
    /// Runtime handle for spawning trigger-action tasks off the tick.
    pub tokio: Handle,
}

pub type PacketHandler = fn(&HandlerContext, &Arc<Player>, &Frame) -> anyhow::Result<()>;

struct Binding {
    name: &'static str,
    handler: PacketHandler,
}

/// Opcode→handler table, assembled from the name bindings in the packet
/// configuration file.
pub struct HandlerTable {
    by_opcode: HashMap<u8, Binding>,
}

impl HandlerTable {
    pub fn new(opcodes: &HashMap<String, u8>) -> Self {
        let mut by_opcode = HashMap::new();
        for &(name, handler) in builtin_handlers() {
            match opcodes.get(name) {
                Some(&opcode) => {
                    by_opcode.insert(opcode, Binding { name, handler });
                }
                None => warn!(name, "no opcode bound for handler"),
            }
        }
        Self { by_opcode }
    }

    pub fn handler_count(&self) -> usize {
        self.by_opcode.len()
    }

    /// Routes one inbound frame. Unknown opcodes and handler rejections are
    /// logged and dropped; neither ends the connection.
    pub fn dispatch(&self, ctx: &HandlerContext, player: &Arc<Player>, frame: &Frame) {
        let Some(binding) = self.by_opcode.get(&frame.opcode) else {
            warn!(
                target: "suspicious",
                player = %player.username,
                opcode = frame.opcode,
                "unknown opcode; dropping frame"
            );
            return;
        };

        if let Err(e) = (binding.handler)(ctx, player, frame) {
            warn!(
                target: "suspicious",
                player = %player.username,
                handler = binding.name,
                "malformed frame: {e:#}"
            );
        }
    }
}

fn builtin_handlers() -> &'static [(&'static str, PacketHandler)] {
    &[
        ("walkto", walk_to),
        ("logout", logout),
        ("ping", ping),
        ("objectaction", scene::object_action),
        ("objectaction2", scene::object_action2),
        ("boundaryaction", scene::boundary_action),
        ("boundaryaction2", scene::boundary_action2),
        ("talktonpc", scene::talk_to_npc),
        ("invonobject", scene::inv_on_object),
        ("invonboundary", scene::inv_on_boundary),
        ("invonplayer", scene::inv_on_player),
        ("prayeron", prayer::prayer_on),
        ("prayeroff", prayer::prayer_off),
        ("shopbuy", shops::shop_buy),
        ("shopsell", shops::shop_sell),
        ("shopclose", shops::shop_close),
    ]
}

fn walk_to(_ctx: &HandlerContext, player: &Arc<Player>, frame: &Frame) -> anyhow::Result<()> {
    if player.busy() {
        return Ok(());
    }
    let mut r = frame.reader();
    let x = i32::from(r.read_u16()?);
    let y = i32::from(r.read_u16()?);

    // A fresh walk supersedes any pending deferred action.
    player.clear_distanced_action();
    player.walk_to(Location::new(x, y));
    Ok(())
}

fn logout(_ctx: &HandlerContext, player: &Arc<Player>, _frame: &Frame) -> anyhow::Result<()> {
    player.request_logout();
    Ok(())
}

fn ping(_ctx: &HandlerContext, _player: &Arc<Player>, _frame: &Frame) -> anyhow::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use mithril_world::{Definitions, PlayerProfile};

    use super::*;
    use crate::config::default_opcode_table;

    fn context() -> (HandlerContext, Arc<Player>, tokio::runtime::Runtime) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let world = Arc::new(World::new(Arc::new(Definitions::default())));
        let player = world.register_player(
            &PlayerProfile {
                username: "alice".to_owned(),
                x: 50,
                y: 50,
                ..PlayerProfile::default()
            },
            [127, 0, 0, 1].into(),
            false,
        );
        (
            HandlerContext {
                world,
                tokio: runtime.handle().clone(),
            },
            player,
            runtime,
        )
    }

    #[test]
    fn every_builtin_gets_an_opcode() {
        let table = HandlerTable::new(&default_opcode_table());
        assert_eq!(table.handler_count(), builtin_handlers().len());
    }

    #[test]
    fn unknown_opcode_is_dropped() {
        let (ctx, player, _rt) = context();
        let table = HandlerTable::new(&default_opcode_table());
        // No handler is bound to opcode 250; dispatch must not panic and
        // must not touch the player.
        table.dispatch(&ctx, &player, &Frame::new(250, [1, 2, 3]));
        assert!(!player.busy());
    }

    #[test]
    fn walk_clears_pending_actions() {
        let (ctx, player, _rt) = context();
        player.set_distanced_action(Box::new(|_, _| mithril_world::ActionResult::NotReady));

        walk_to(&ctx, &player, &Frame::new(0, [0, 60, 0, 60])).unwrap();
        assert!(player.mobile.has_path());

        // The pending action is gone; running does nothing.
        Player::run_distanced_action(&player, &ctx.world);
    }

    #[test]
    fn busy_player_ignores_walks() {
        let (ctx, player, _rt) = context();
        let _guard = mithril_world::StateGuard::claim(player.clone(), mithril_world::state::BUSY);
        walk_to(&ctx, &player, &Frame::new(0, [0, 60, 0, 60])).unwrap();
        assert!(!player.mobile.has_path());
    }
}
