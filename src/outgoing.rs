//! Builders for the immediate (non-broadcast) server→client frames: the
//! login welcome sequence, stat and inventory refreshes, and shop views.

use mithril_protocol::{op, Frame, FrameBuilder};
use mithril_world::{skill_by_index, Definitions, Player, Shop, SKILL_COUNT};

/// The welcome frame sent right after login intake.
pub fn welcome(player: &Player) -> Frame {
    FrameBuilder::new(op::WELCOME_INFO)
        .put_u16(player.index as u16)
        .put_str(&player.ip.to_string())
        .build()
}

/// All eighteen skills: current, maximum, experience.
pub fn stats(player: &Player) -> Frame {
    let mut builder = FrameBuilder::new(op::STATS);
    for i in 0..SKILL_COUNT {
        let skill = skill_by_index(i).expect("index in range");
        builder = builder
            .put_u8(player.skills.current(skill) as u8)
            .put_u8(player.skills.maximum(skill) as u8)
            .put_u32(player.skills.experience(skill) as u32);
    }
    builder.build()
}

/// The full inventory listing.
pub fn inventory(player: &Player) -> Frame {
    let items = player.inventory.snapshot();
    let mut builder = FrameBuilder::new(op::INVENTORY_ITEMS).put_u8(items.len() as u8);
    for item in items {
        builder = builder.put_u16(item.id as u16).put_u32(item.amount);
    }
    builder.build()
}

/// A shop's stock with live prices, re-sent to every viewer after each
/// trade.
pub fn shop_view(shop: &Shop, defs: &Definitions) -> Frame {
    let stock = shop.stock_snapshot();
    let mut builder = FrameBuilder::new(op::SHOP_OPEN)
        .put_str(&shop.name)
        .put_u8(stock.len() as u8);
    for entry in stock {
        builder = builder
            .put_u16(entry.id as u16)
            .put_u16(entry.amount.max(0) as u16)
            .put_u32(shop.sale_price(entry.id, defs) as u32)
            .put_u32(shop.purchase_price(entry.id, defs) as u32);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use mithril_world::PlayerProfile;

    use super::*;

    #[test]
    fn stats_frame_covers_every_skill() {
        let player = Player::new(
            0,
            1,
            &PlayerProfile {
                username: "alice".to_owned(),
                ..PlayerProfile::default()
            },
            [127, 0, 0, 1].into(),
            false,
        );

        let frame = stats(&player);
        // 18 skills x (1 + 1 + 4 bytes).
        assert_eq!(frame.body.len(), SKILL_COUNT * 6);
    }
}
