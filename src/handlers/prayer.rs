use std::sync::Arc;

use mithril_protocol::Frame;
use mithril_world::{Player, Skill, PRAYER_COUNT};
use tracing::warn;

use super::HandlerContext;

/// Prayer level requirements, prayer 0 through 13 in order.
const REQUIRED_LEVELS: [i32; PRAYER_COUNT] =
    [1, 4, 7, 10, 13, 16, 19, 22, 25, 28, 31, 34, 37, 40];

fn checked_prayer_index(player: &Player, frame: &Frame, verb: &str) -> anyhow::Result<Option<usize>> {
    let index = usize::from(frame.reader().read_u8()?);

    if index >= PRAYER_COUNT {
        warn!(
            target: "suspicious",
            player = %player.username,
            index,
            "turned {verb} a prayer that doesn't exist"
        );
        return Ok(None);
    }
    if REQUIRED_LEVELS[index] > player.skills.maximum(Skill::Prayer) {
        warn!(
            target: "suspicious",
            player = %player.username,
            index,
            "turned {verb} a prayer they are too low level for"
        );
        return Ok(None);
    }
    Ok(Some(index))
}

pub(super) fn prayer_on(
    _ctx: &HandlerContext,
    player: &Arc<Player>,
    frame: &Frame,
) -> anyhow::Result<()> {
    if let Some(index) = checked_prayer_index(player, frame, "on")? {
        player.set_prayer(index, true);
        player.send_frame(&player.prayer_frame());
    }
    Ok(())
}

pub(super) fn prayer_off(
    _ctx: &HandlerContext,
    player: &Arc<Player>,
    frame: &Frame,
) -> anyhow::Result<()> {
    if let Some(index) = checked_prayer_index(player, frame, "off")? {
        if player.prayer_active(index) {
            player.set_prayer(index, false);
        }
        player.send_frame(&player.prayer_frame());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use mithril_world::{Definitions, PlayerProfile, World};

    use super::*;

    fn setup() -> (HandlerContext, Arc<Player>, tokio::runtime::Runtime) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let world = Arc::new(World::new(Arc::new(Definitions::default())));
        let player = world.register_player(
            &PlayerProfile {
                username: "alice".to_owned(),
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
    fn prayer_requires_level() {
        let (ctx, player, _rt) = setup();
        // Prayer level 1: only the first prayer is available.
        prayer_on(&ctx, &player, &Frame::new(0, [0])).unwrap();
        assert!(player.prayer_active(0));

        prayer_on(&ctx, &player, &Frame::new(0, [5])).unwrap();
        assert!(!player.prayer_active(5));

        player.skills.set_maximum(Skill::Prayer, 40);
        prayer_on(&ctx, &player, &Frame::new(0, [13])).unwrap();
        assert!(player.prayer_active(13));
    }

    #[test]
    fn out_of_range_prayer_is_dropped() {
        let (ctx, player, _rt) = setup();
        prayer_on(&ctx, &player, &Frame::new(0, [14])).unwrap();
        for i in 0..PRAYER_COUNT {
            assert!(!player.prayer_active(i));
        }
    }

    #[test]
    fn prayer_off_is_idempotent() {
        let (ctx, player, _rt) = setup();
        prayer_on(&ctx, &player, &Frame::new(0, [0])).unwrap();
        prayer_off(&ctx, &player, &Frame::new(0, [0])).unwrap();
        prayer_off(&ctx, &player, &Frame::new(0, [0])).unwrap();
        assert!(!player.prayer_active(0));
    }
}
