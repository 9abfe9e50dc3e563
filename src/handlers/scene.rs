//! Scene interaction handlers: objects, boundaries, NPC talk, and
//! item-on-target actions. All of these are distanced: the handler
//! validates the intent, then installs a deferred action that walks the
//! player in and fires the first matching trigger on arrival.

use std::sync::Arc;

use mithril_protocol::Frame;
use mithril_world::triggers::{InvOnObjectAction, ObjectAction};
use mithril_world::{
    state, ActionResult, Item, Location, Object, Player, StateGuard, World,
    DEFAULT_ACTION_MESSAGE,
};
use tokio::runtime::Handle;
use tracing::warn;

use super::HandlerContext;

/// Adjacent to (or standing on) the object's footprint.
fn at_object(world: &World, player: &Player, object: &Object) -> bool {
    let (w, h) = object.footprint(&world.defs);
    player.mobile.loc().within_rect_range(object.loc, w, h, 1)
}

/// Adjacent to either endpoint of a boundary.
fn at_boundary(world: &World, player: &Player, object: &Object) -> bool {
    let (a, b) = object.boundary_endpoints();
    let loc = player.mobile.loc();
    world.next_to(loc, a) || world.next_to(loc, b)
}

/// Claims `Busy` and runs the matched action (or the default message) on
/// its own task so script work never stalls the tick.
fn spawn_with_busy(tokio: &Handle, player: &Arc<Player>, run: impl FnOnce() + Send + 'static) {
    let guard = StateGuard::claim(player.clone(), state::BUSY);
    tokio.spawn_blocking(move || {
        let _guard = guard;
        run();
    });
}

fn fire_object_trigger(
    tokio: &Handle,
    action: Option<Arc<ObjectAction>>,
    player: &Arc<Player>,
    object: &Arc<Object>,
    variant: u8,
) {
    let player2 = player.clone();
    let object = object.clone();
    spawn_with_busy(tokio, player, move || match action {
        Some(action) => action(player2, object, variant),
        None => player2.message(DEFAULT_ACTION_MESSAGE),
    });
}

fn object_action_variant(
    ctx: &HandlerContext,
    player: &Arc<Player>,
    frame: &Frame,
    variant: u8,
) -> anyhow::Result<()> {
    if player.busy() {
        return Ok(());
    }
    let mut r = frame.reader();
    let loc = Location::new(i32::from(r.read_u16()?), i32::from(r.read_u16()?));

    let Some(object) = ctx.world.scenery_at(loc) else {
        warn!(
            target: "suspicious",
            player = %player.username,
            x = loc.x, y = loc.y,
            "attempted to use a non-existent object"
        );
        return Ok(());
    };

    let tokio = ctx.tokio.clone();
    player.set_distanced_action(Box::new(move |world, player| {
        // The target must still be the object the client clicked.
        match world.scenery_at(object.loc) {
            Some(live) if Arc::ptr_eq(&live, &object) => {}
            _ => return ActionResult::Aborted,
        }
        if player.busy() {
            return ActionResult::Completed;
        }
        if at_object(world, player, &object) {
            player.mobile.reset_path();
            let action = world.triggers.objects.find(|pred| pred(&object, variant));
            fire_object_trigger(&tokio, action, player, &object, variant);
            return ActionResult::Completed;
        }
        if !player.mobile.has_path() {
            player.walk_to(object.loc);
        }
        ActionResult::NotReady
    }));
    Ok(())
}

pub(super) fn object_action(
    ctx: &HandlerContext,
    player: &Arc<Player>,
    frame: &Frame,
) -> anyhow::Result<()> {
    object_action_variant(ctx, player, frame, 0)
}

pub(super) fn object_action2(
    ctx: &HandlerContext,
    player: &Arc<Player>,
    frame: &Frame,
) -> anyhow::Result<()> {
    object_action_variant(ctx, player, frame, 1)
}

fn boundary_action_variant(
    ctx: &HandlerContext,
    player: &Arc<Player>,
    frame: &Frame,
    variant: u8,
) -> anyhow::Result<()> {
    if player.busy() {
        return Ok(());
    }
    let mut r = frame.reader();
    let loc = Location::new(i32::from(r.read_u16()?), i32::from(r.read_u16()?));

    let Some(object) = ctx.world.boundary_at(loc) else {
        warn!(
            target: "suspicious",
            player = %player.username,
            x = loc.x, y = loc.y,
            "attempted to use a non-existent boundary"
        );
        return Ok(());
    };

    let tokio = ctx.tokio.clone();
    player.set_distanced_action(Box::new(move |world, player| {
        match world.boundary_at(object.loc) {
            Some(live) if Arc::ptr_eq(&live, &object) => {}
            _ => return ActionResult::Aborted,
        }
        if player.busy() {
            return ActionResult::Completed;
        }
        if at_boundary(world, player, &object) {
            player.mobile.reset_path();
            let action = world
                .triggers
                .boundaries
                .find(|pred| pred(&object, variant));
            fire_object_trigger(&tokio, action, player, &object, variant);
            return ActionResult::Completed;
        }
        if !player.mobile.has_path() {
            player.walk_to(object.loc);
        }
        ActionResult::NotReady
    }));
    Ok(())
}

pub(super) fn boundary_action(
    ctx: &HandlerContext,
    player: &Arc<Player>,
    frame: &Frame,
) -> anyhow::Result<()> {
    boundary_action_variant(ctx, player, frame, 0)
}

pub(super) fn boundary_action2(
    ctx: &HandlerContext,
    player: &Arc<Player>,
    frame: &Frame,
) -> anyhow::Result<()> {
    boundary_action_variant(ctx, player, frame, 1)
}

/// Talk-to-NPC: a walking-arrival action. On arrival both mobs face each
/// other; an NPC sharing the player's exact tile is displaced one tile into
/// the first open adjacent cell.
pub(super) fn talk_to_npc(
    ctx: &HandlerContext,
    player: &Arc<Player>,
    frame: &Frame,
) -> anyhow::Result<()> {
    let mut r = frame.reader();
    let index = usize::from(r.read_u16()?);

    let Some(npc) = ctx.world.npcs.get(index) else {
        warn!(
            target: "suspicious",
            player = %player.username,
            index,
            "attempted to talk to a non-existent npc"
        );
        return Ok(());
    };
    if player.states.has(state::FIGHTING) {
        return Ok(());
    }

    let npc_ref = mithril_world::MobRef {
        index: npc.index,
        generation: npc.generation,
    };
    let tokio = ctx.tokio.clone();

    player.set_distanced_action(Box::new(move |world, player| {
        let Some(npc) = world.npcs.deref(npc_ref) else {
            return ActionResult::Aborted;
        };

        let at = player.mobile.loc();
        let npc_at = npc.mobile.loc();
        if !(at.within_range(npc_at, 1) && world.next_to(at, npc_at)) {
            if !player.mobile.has_path() {
                player.walk_to(npc_at);
            }
            return ActionResult::NotReady;
        }

        player.mobile.reset_path();
        let name = npc.name(&world.defs).to_owned();
        if npc.busy() || npc.states.has(state::CHATTING) {
            player.message(&format!("{name} is busy at the moment"));
            return ActionResult::Completed;
        }
        if player.busy() {
            return ActionResult::Completed;
        }

        let Some(action) = world.triggers.npc_talk.find(|pred| pred(&npc)) else {
            player.message(&format!("The {name} does not appear interested in talking"));
            return ActionResult::Completed;
        };

        npc.mobile.reset_path();
        if player.mobile.loc() == npc.mobile.loc() {
            if let Some(cell) = world.first_open_adjacent(player.mobile.loc()) {
                world.displace_npc(&npc, cell);
            }
        }
        if player.mobile.loc() != npc.mobile.loc() {
            player.mobile.face(npc.mobile.loc());
            npc.mobile.face(player.mobile.loc());
        }

        let player_guard = StateGuard::claim(player.clone(), state::BUSY | state::CHATTING);
        let npc_guard = StateGuard::claim(npc.clone(), state::BUSY | state::CHATTING);
        let player2 = player.clone();
        tokio.spawn_blocking(move || {
            let _player_guard = player_guard;
            let _npc_guard = npc_guard;
            action(player2, npc);
        });
        ActionResult::Completed
    }));
    Ok(())
}

/// Reads and validates an inventory index against the player's inventory.
fn checked_inv_item(player: &Player, index: usize, what: &str) -> Option<Item> {
    match player.inventory.get(index) {
        Some(item) => Some(item),
        None => {
            warn!(
                target: "suspicious",
                player = %player.username,
                index,
                capacity = player.inventory.size(),
                "attempted to use a non-existent item on a {what}"
            );
            None
        }
    }
}

fn fire_inv_trigger(
    tokio: &Handle,
    action: Option<Arc<InvOnObjectAction>>,
    player: &Arc<Player>,
    object: &Arc<Object>,
    item: Item,
) {
    let player2 = player.clone();
    let object = object.clone();
    spawn_with_busy(tokio, player, move || match action {
        Some(action) => action(player2, object, item),
        None => player2.message(DEFAULT_ACTION_MESSAGE),
    });
}

fn inv_on_scenery_or_boundary(
    ctx: &HandlerContext,
    player: &Arc<Player>,
    frame: &Frame,
    boundary: bool,
) -> anyhow::Result<()> {
    let mut r = frame.reader();
    let loc = Location::new(i32::from(r.read_u16()?), i32::from(r.read_u16()?));
    if boundary {
        // Direction byte; unused here.
        r.read_u8()?;
    }
    let inv_index = usize::from(r.read_u16()?);

    let object = if boundary {
        ctx.world.boundary_at(loc)
    } else {
        ctx.world.scenery_at(loc)
    };
    let Some(object) = object else {
        warn!(
            target: "suspicious",
            player = %player.username,
            x = loc.x, y = loc.y, boundary,
            "attempted to use an item on a non-existent target"
        );
        return Ok(());
    };
    let Some(item) = checked_inv_item(player, inv_index, if boundary { "boundary" } else { "object" })
    else {
        return Ok(());
    };

    let tokio = ctx.tokio.clone();
    player.walk_to(object.loc);
    player.set_distanced_action(Box::new(move |world, player| {
        let live = if object.boundary {
            world.boundary_at(object.loc)
        } else {
            world.scenery_at(object.loc)
        };
        match live {
            Some(live) if Arc::ptr_eq(&live, &object) => {}
            _ => return ActionResult::Aborted,
        }
        if player.busy() {
            return ActionResult::Completed;
        }

        let arrived = if object.boundary {
            at_boundary(world, player, &object)
        } else {
            at_object(world, player, &object)
        };
        if !arrived {
            if !player.mobile.has_path() {
                player.walk_to(object.loc);
            }
            return ActionResult::NotReady;
        }

        player.mobile.reset_path();
        let table = if object.boundary {
            &world.triggers.inv_on_boundary
        } else {
            &world.triggers.inv_on_object
        };
        let action = table.find(|pred| pred(&object, &item));
        fire_inv_trigger(&tokio, action, player, &object, item);
        ActionResult::Completed
    }));
    Ok(())
}

pub(super) fn inv_on_object(
    ctx: &HandlerContext,
    player: &Arc<Player>,
    frame: &Frame,
) -> anyhow::Result<()> {
    inv_on_scenery_or_boundary(ctx, player, frame, false)
}

pub(super) fn inv_on_boundary(
    ctx: &HandlerContext,
    player: &Arc<Player>,
    frame: &Frame,
) -> anyhow::Result<()> {
    inv_on_scenery_or_boundary(ctx, player, frame, true)
}

pub(super) fn inv_on_player(
    ctx: &HandlerContext,
    player: &Arc<Player>,
    frame: &Frame,
) -> anyhow::Result<()> {
    let mut r = frame.reader();
    let target_index = usize::from(r.read_u16()?);
    let inv_index = usize::from(r.read_u16()?);

    if target_index == player.index {
        warn!(
            target: "suspicious",
            player = %player.username,
            "attempted to use an inventory item on themself"
        );
        return Ok(());
    }
    let Some(target) = ctx.world.players.get(target_index) else {
        warn!(
            target: "suspicious",
            player = %player.username,
            target_index,
            "attempted to use an item on a player that doesn't exist"
        );
        return Ok(());
    };
    let Some(item) = checked_inv_item(player, inv_index, "player") else {
        return Ok(());
    };

    let target_ref = ctx.world.player_ref(&target);
    let tokio = ctx.tokio.clone();

    player.set_distanced_action(Box::new(move |world, player| {
        let Some(target) = world.players.deref(target_ref) else {
            return ActionResult::Aborted;
        };
        if player.busy() || target.busy() || !target.connected() {
            return ActionResult::Completed;
        }

        let at = player.mobile.loc();
        let target_at = target.mobile.loc();
        if !(at.within_range(target_at, 1) && world.next_to(at, target_at)) {
            if !player.mobile.has_path() {
                player.walk_to(target_at);
            }
            return ActionResult::NotReady;
        }

        player.mobile.reset_path();
        let action = world.triggers.inv_on_player.find(|pred| pred(&item));
        let player_guard = StateGuard::claim(player.clone(), state::BUSY);
        let target_guard = StateGuard::claim(target.clone(), state::BUSY);
        let player2 = player.clone();
        tokio.spawn_blocking(move || {
            let _player_guard = player_guard;
            let _target_guard = target_guard;
            match action {
                Some(action) => action(player2, target, item),
                None => player2.message(DEFAULT_ACTION_MESSAGE),
            }
        });
        ActionResult::Completed
    }));
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use mithril_world::triggers::Triggers;
    use mithril_world::{CollisionMap, Definitions, PlayerProfile};

    use super::*;
    use crate::handlers::HandlerContext;

    fn setup_with(triggers: Triggers) -> (HandlerContext, Arc<Player>, tokio::runtime::Runtime) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let world = Arc::new(World::with_parts(
            Arc::new(Definitions::default()),
            CollisionMap::new(),
            triggers,
        ));
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

    fn setup() -> (HandlerContext, Arc<Player>, tokio::runtime::Runtime) {
        setup_with(Triggers::default())
    }

    fn click(x: u16, y: u16) -> Frame {
        Frame::new(
            0,
            [
                (x >> 8) as u8,
                (x & 0xff) as u8,
                (y >> 8) as u8,
                (y & 0xff) as u8,
            ],
        )
    }

    fn wait_until(what: impl Fn() -> bool) -> bool {
        for _ in 0..200 {
            if what() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn distanced_action_walks_then_fires() {
        let fired = Arc::new(AtomicBool::new(false));
        let observed = fired.clone();

        let mut triggers = Triggers::default();
        triggers.objects.register(
            Box::new(|object, variant| object.id == 1 && variant == 0),
            Arc::new(move |_, _, _| observed.store(true, Ordering::SeqCst)),
        );

        let (ctx, player, _rt) = setup_with(triggers);
        ctx.world
            .add_object(Object::new(1, 0, Location::new(53, 50), false))
            .unwrap();

        object_action(&ctx, &player, &click(53, 50)).unwrap();

        // Tick N: not in range; the action paths toward the object.
        Player::run_distanced_action(&player, &ctx.world);
        ctx.world.traverse_player(&player);
        assert_eq!(player.mobile.loc(), Location::new(51, 50));
        assert!(!fired.load(Ordering::SeqCst));

        // Tick N+1.
        Player::run_distanced_action(&player, &ctx.world);
        ctx.world.traverse_player(&player);
        assert_eq!(player.mobile.loc(), Location::new(52, 50));

        // Tick N+2: in range; the trigger fires once on its own task and
        // Busy releases when it finishes.
        Player::run_distanced_action(&player, &ctx.world);
        assert!(wait_until(|| fired.load(Ordering::SeqCst)));
        assert!(wait_until(|| !player.busy()));

        // The action completed; later ticks fire nothing.
        fired.store(false, Ordering::SeqCst);
        Player::run_distanced_action(&player, &ctx.world);
        std::thread::sleep(Duration::from_millis(25));
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn busy_player_ignores_object_actions() {
        let (ctx, player, _rt) = setup();
        ctx.world
            .add_object(Object::new(1, 0, Location::new(53, 50), false))
            .unwrap();

        let _guard = StateGuard::claim(player.clone(), state::BUSY);
        object_action(&ctx, &player, &click(53, 50)).unwrap();

        Player::run_distanced_action(&player, &ctx.world);
        assert!(!player.mobile.has_path());
    }

    #[test]
    fn wrong_kind_is_suspicious_not_fatal() {
        let (ctx, player, _rt) = setup();
        ctx.world
            .add_object(Object::new(1, 0, Location::new(53, 50), true))
            .unwrap();

        // A boundary where scenery was claimed: dropped, no action.
        object_action(&ctx, &player, &click(53, 50)).unwrap();
        Player::run_distanced_action(&player, &ctx.world);
        assert!(!player.mobile.has_path());
    }

    #[test]
    fn vanished_target_aborts_silently() {
        let (ctx, player, _rt) = setup();
        let object = ctx
            .world
            .add_object(Object::new(1, 0, Location::new(53, 50), false))
            .unwrap();

        object_action(&ctx, &player, &click(53, 50)).unwrap();
        ctx.world.remove_object(&object);

        Player::run_distanced_action(&player, &ctx.world);
        // Aborted: no path begins.
        assert!(!player.mobile.has_path());
    }
}
