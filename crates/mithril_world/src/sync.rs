//! Per-player broadcast frames, computed at the end of each tick.
//!
//! Every builder is diff-driven: it compares the world as it stands now
//! against what the player's client was last told, records the new state in
//! the player's bookkeeping, and emits a frame only when there is content.
//! The tick engine calls [`enqueue_updates`] for every player, which runs
//! the builders in the protocol's fixed order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use mithril_protocol::{op, Frame, FrameBuilder};

use crate::{dirty, GroundItem, Object, Player, RegionView, World};

/// Marker id for a removal record in the location frames.
const REMOVED: u16 = 0xffff;

/// Runs every builder in the protocol's broadcast order, enqueueing each
/// non-empty frame on the player's outbound queue.
pub fn enqueue_updates(world: &World, player: &Arc<Player>) {
    let frames = [
        player_positions(world, player),
        npc_positions(world, player),
        player_appearances(world, player),
        npc_events(world, player),
        object_locations(world, player),
        boundary_locations(world, player),
        item_locations(world, player),
        clear_distant_chunks(world, player),
        plane_info(world, player),
    ];
    for frame in frames.into_iter().flatten() {
        player.send_frame(&frame);
    }
}

/// Positions of every player in view, the viewer first. Emitted when view
/// membership changed or any member moved this tick.
pub fn player_positions(world: &World, player: &Arc<Player>) -> Option<Frame> {
    let view = RegionView::of(player.mobile.loc());
    let mut visible = world.players_in_view(view);
    visible.sort_by_key(|p| (p.index != player.index, p.index));

    let new_set: HashSet<usize> = visible.iter().map(|p| p.index).collect();
    let mut known = player.known_players.lock();

    let moved = visible.iter().any(|p| {
        p.mobile
            .is_dirty(dirty::REGION_MOVED | dirty::SPRITE_UPDATED | dirty::REGION_REMOVED)
    });
    if *known == new_set && !moved {
        return None;
    }

    for p in &visible {
        if !known.contains(&p.index) && p.index != player.index {
            player.pending_appearances.lock().push(p.index);
        }
    }
    *known = new_set;

    let mut builder = FrameBuilder::new(op::PLAYER_POSITIONS).put_u16(visible.len() as u16);
    for p in &visible {
        let loc = p.mobile.loc();
        builder = builder
            .put_u16(p.index as u16)
            .put_u16(loc.x as u16)
            .put_u16(loc.y as u16)
            .put_u8(p.mobile.direction().sprite());
    }
    Some(builder.build())
}

/// Positions of every NPC in view, same policy as player positions.
pub fn npc_positions(world: &World, player: &Arc<Player>) -> Option<Frame> {
    let view = RegionView::of(player.mobile.loc());
    let mut visible = world.npcs_in_view(view);
    visible.sort_by_key(|n| n.index);

    let new_set: HashSet<usize> = visible.iter().map(|n| n.index).collect();
    let mut known = player.known_npcs.lock();

    let moved = visible.iter().any(|n| {
        n.mobile
            .is_dirty(dirty::REGION_MOVED | dirty::SPRITE_UPDATED | dirty::REGION_REMOVED)
    });
    if *known == new_set && !moved {
        return None;
    }
    *known = new_set;

    let mut builder = FrameBuilder::new(op::NPC_POSITIONS).put_u16(visible.len() as u16);
    for n in &visible {
        let loc = n.mobile.loc();
        builder = builder
            .put_u16(n.index as u16)
            .put_u16(n.id as u16)
            .put_u16(loc.x as u16)
            .put_u16(loc.y as u16)
            .put_u8(n.mobile.direction().sprite());
    }
    Some(builder.build())
}

/// Appearance records for newly seen players and anyone whose looks changed
/// this tick.
pub fn player_appearances(world: &World, player: &Arc<Player>) -> Option<Frame> {
    let view = RegionView::of(player.mobile.loc());
    let mut wanted: Vec<usize> = player.pending_appearances.lock().drain(..).collect();
    for p in world.players_in_view(view) {
        if p.mobile.is_dirty(dirty::APPEARANCE_CHANGED) && !wanted.contains(&p.index) {
            wanted.push(p.index);
        }
    }

    let records: Vec<Arc<Player>> = wanted
        .into_iter()
        .filter_map(|index| world.players.get(index))
        .collect();
    if records.is_empty() {
        return None;
    }

    let mut builder = FrameBuilder::new(op::PLAYER_APPEARANCES).put_u16(records.len() as u16);
    for p in &records {
        let appearance = *p.appearance.read();
        builder = builder
            .put_u16(p.index as u16)
            .put_str(&p.username)
            .put_u8(appearance.head as u8)
            .put_u8(appearance.body as u8)
            .put_u8(appearance.legs as u8)
            .put_u8(appearance.head_color as u8)
            .put_u8(appearance.body_color as u8)
            .put_u8(appearance.legs_color as u8)
            .put_u8(appearance.skin_color as u8)
            .put_u8(u8::from(appearance.male))
            .put_u8(p.skills.combat_level() as u8);
    }
    Some(builder.build())
}

/// NPC chat/damage events raised this tick, filtered to the viewer's
/// regions.
pub fn npc_events(world: &World, player: &Arc<Player>) -> Option<Frame> {
    let view = RegionView::of(player.mobile.loc());
    let events: Vec<_> = world
        .npc_events_snapshot()
        .into_iter()
        .filter(|event| {
            world
                .npcs
                .get(event.npc_index)
                .is_some_and(|npc| view.contains_tile(npc.mobile.loc()))
        })
        .collect();
    if events.is_empty() {
        return None;
    }

    let mut builder = FrameBuilder::new(op::NPC_EVENTS).put_u16(events.len() as u16);
    for event in &events {
        builder = builder
            .put_u16(event.npc_index as u16)
            .put_u8(event.kind)
            .put_u32(event.value as u32);
    }
    Some(builder.build())
}

fn location_diff(
    opcode: u8,
    known: &mut HashMap<crate::Location, u32>,
    current: Vec<Arc<Object>>,
    view: RegionView,
) -> Option<Frame> {
    let live: HashMap<crate::Location, u32> = current
        .iter()
        .filter(|o| view.contains_tile(o.loc))
        .map(|o| (o.loc, o.id))
        .collect();

    let mut builder = FrameBuilder::new(opcode);
    let mut dirs: HashMap<crate::Location, u8> = HashMap::new();
    for o in &current {
        dirs.insert(o.loc, o.direction);
    }

    // Removals first (and replacements, which are a removal plus an add).
    for (&loc, &id) in known.iter() {
        if live.get(&loc) != Some(&id) {
            builder = builder
                .put_u16(REMOVED)
                .put_u16(loc.x as u16)
                .put_u16(loc.y as u16)
                .put_u8(0);
        }
    }
    for (&loc, &id) in &live {
        if known.get(&loc) != Some(&id) {
            builder = builder
                .put_u16(id as u16)
                .put_u16(loc.x as u16)
                .put_u16(loc.y as u16)
                .put_u8(dirs.get(&loc).copied().unwrap_or(0));
        }
    }

    if builder.is_empty() {
        return None;
    }
    *known = live;
    Some(builder.build())
}

/// Scenery added or removed within view since last tick.
pub fn object_locations(world: &World, player: &Arc<Player>) -> Option<Frame> {
    let view = RegionView::of(player.mobile.loc());
    location_diff(
        op::OBJECT_LOCATIONS,
        &mut player.known_objects.lock(),
        world.all_scenery(),
        view,
    )
}

/// Boundaries added or removed within view since last tick.
pub fn boundary_locations(world: &World, player: &Arc<Player>) -> Option<Frame> {
    let view = RegionView::of(player.mobile.loc());
    location_diff(
        op::BOUNDARY_LOCATIONS,
        &mut player.known_boundaries.lock(),
        world.all_boundaries(),
        view,
    )
}

/// Ground item stacks appearing or vanishing for this viewer, honoring the
/// owner-visibility window.
pub fn item_locations(world: &World, player: &Arc<Player>) -> Option<Frame> {
    let view = RegionView::of(player.mobile.loc());
    let tick = world.current_tick();

    let live: HashMap<u64, Arc<GroundItem>> = world
        .items_in_view(view)
        .into_iter()
        .filter(|item| item.visible_to(player.username_hash, tick))
        .map(|item| (item.seq, item))
        .collect();

    let mut known = player.known_items.lock();
    let mut builder = FrameBuilder::new(op::ITEM_LOCATIONS);

    for (seq, &(_, loc)) in known.iter() {
        if !live.contains_key(seq) {
            builder = builder
                .put_u16(REMOVED)
                .put_u32(0)
                .put_u16(loc.x as u16)
                .put_u16(loc.y as u16);
        }
    }
    for (seq, item) in &live {
        if !known.contains_key(seq) {
            builder = builder
                .put_u16(item.id as u16)
                .put_u32(item.amount)
                .put_u16(item.loc.x as u16)
                .put_u16(item.loc.y as u16);
        }
    }

    if builder.is_empty() {
        return None;
    }
    *known = live
        .into_iter()
        .map(|(seq, item)| (seq, (item.id, item.loc)))
        .collect();
    Some(builder.build())
}

/// Region coordinates that fell out of the 3x3 view this tick, so the
/// client can drop their entities wholesale.
pub fn clear_distant_chunks(_world: &World, player: &Arc<Player>) -> Option<Frame> {
    let view = RegionView::of(player.mobile.loc());
    let mut last = player.last_view.lock();
    let previous = last.replace(view);

    let Some(previous) = previous else {
        return None;
    };
    if previous == view {
        return None;
    }

    let dropped: Vec<_> = previous.diff(view).collect();
    if dropped.is_empty() {
        return None;
    }

    let mut builder = FrameBuilder::new(op::CLEAR_DISTANT_CHUNKS).put_u16(dropped.len() as u16);
    for coord in dropped {
        builder = builder.put_u16(coord.x as u16).put_u16(coord.y as u16);
    }
    Some(builder.build())
}

/// The player's plane, sent only when it changed since last tick.
pub fn plane_info(_world: &World, player: &Arc<Player>) -> Option<Frame> {
    let plane = i64::from(player.mobile.loc().plane());
    if player.var("last_plane") == Some(plane) {
        return None;
    }
    player.set_var("last_plane", plane);
    Some(
        FrameBuilder::new(op::PLANE_INFO)
            .put_u16(plane as u16)
            .put_u16(crate::PLANE_HEIGHT as u16)
            .build(),
    )
}
