use std::sync::Arc;

use mithril_protocol::Frame;
use mithril_world::{state, Player, Shop, World};
use tracing::warn;

use super::HandlerContext;
use crate::outgoing;

/// The coin item id; shop trades settle in these.
const COINS: u32 = 10;

fn current_shop(player: &Player, what: &str) -> Option<Arc<Shop>> {
    if !player.states.has(state::SHOPPING) {
        return None;
    }
    let shop = player.current_shop();
    if shop.is_none() {
        warn!(
            target: "suspicious",
            player = %player.username,
            "tried {what} but is not accessing any shop"
        );
    }
    shop
}

/// Pushes the refreshed stock to every player viewing the same shop.
fn broadcast_shop(world: &World, shop: &Arc<Shop>) {
    let frame = outgoing::shop_view(shop, &world.defs);
    for viewer in world.players.snapshot() {
        if viewer
            .current_shop()
            .is_some_and(|open| Arc::ptr_eq(&open, shop))
        {
            viewer.send_frame(&frame);
        }
    }
}

pub(super) fn shop_buy(
    ctx: &HandlerContext,
    player: &Arc<Player>,
    frame: &Frame,
) -> anyhow::Result<()> {
    let Some(shop) = current_shop(player, "purchasing from a shop") else {
        return Ok(());
    };

    let mut r = frame.reader();
    let id = u32::from(r.read_u16()?);
    let offered = r.read_u32()? as i32;

    let Some(entry) = shop.entry(id) else {
        warn!(
            target: "suspicious",
            player = %player.username, id,
            "tried buying an item the shop does not carry"
        );
        return Ok(());
    };
    if entry.amount < 1 {
        warn!(
            target: "suspicious",
            player = %player.username, id, offered,
            "tried buying an item the shop is out of"
        );
        return Ok(());
    }

    let price = shop.sale_price(id, &ctx.world.defs);
    if offered != price {
        warn!(
            target: "suspicious",
            player = %player.username, id, offered, price,
            "tried buying at a stale price"
        );
        return Ok(());
    }

    if player.inventory.remove_by_id(COINS, price.max(0) as u32).is_some() {
        player.inventory.add(id, 1, &ctx.world.defs);
        shop.take_one(id);
        player.send_frame(&outgoing::inventory(player));
        broadcast_shop(&ctx.world, &shop);
    }
    Ok(())
}

pub(super) fn shop_sell(
    ctx: &HandlerContext,
    player: &Arc<Player>,
    frame: &Frame,
) -> anyhow::Result<()> {
    let Some(shop) = current_shop(player, "selling to a shop") else {
        return Ok(());
    };

    let mut r = frame.reader();
    let id = u32::from(r.read_u16()?);
    let offered = r.read_u32()? as i32;

    let price = shop.purchase_price(id, &ctx.world.defs);
    if offered != price {
        warn!(
            target: "suspicious",
            player = %player.username, id, offered, price,
            "tried selling at a stale price"
        );
        return Ok(());
    }

    if player.inventory.remove_by_id(id, 1).is_some() {
        player.inventory.add(COINS, price.max(0) as u32, &ctx.world.defs);
        shop.put_one(id);
        player.send_frame(&outgoing::inventory(player));
        broadcast_shop(&ctx.world, &shop);
    }
    Ok(())
}

pub(super) fn shop_close(
    _ctx: &HandlerContext,
    player: &Arc<Player>,
    _frame: &Frame,
) -> anyhow::Result<()> {
    if player.states.has(state::SHOPPING) {
        player.close_shop();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use mithril_world::{Definitions, ItemDef, PlayerProfile};

    use super::*;

    fn defs() -> Definitions {
        let mut defs = Definitions::default();
        for id in 0..30_u32 {
            defs.items.push(ItemDef {
                id,
                base_price: if id == COINS { 1 } else { 100 },
                stackable: id == COINS,
                ..ItemDef::default()
            });
        }
        defs
    }

    fn setup() -> (HandlerContext, Arc<Player>, tokio::runtime::Runtime) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let world = Arc::new(World::new(Arc::new(defs())));
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

    fn buy_frame(id: u16, price: i32) -> Frame {
        let p = price as u32;
        Frame::new(
            0,
            [
                (id >> 8) as u8,
                (id & 0xff) as u8,
                (p >> 24) as u8,
                (p >> 16) as u8,
                (p >> 8) as u8,
                p as u8,
            ],
        )
    }

    #[test]
    fn buying_moves_coins_and_stock() {
        let (ctx, player, _rt) = setup();
        let shop = Arc::new(Shop::new("General Store", [(7, 5)], 130, 40));
        player.open_shop(shop.clone());
        player.inventory.add(COINS, 1000, &ctx.world.defs);

        let price = shop.sale_price(7, &ctx.world.defs);
        shop_buy(&ctx, &player, &buy_frame(7, price)).unwrap();

        assert_eq!(player.inventory.count_of(7), 1);
        assert_eq!(player.inventory.count_of(COINS), 1000 - price.max(0) as u32);
        assert_eq!(shop.entry(7).unwrap().amount, 4);
    }

    #[test]
    fn stale_price_is_rejected() {
        let (ctx, player, _rt) = setup();
        let shop = Arc::new(Shop::new("General Store", [(7, 5)], 130, 40));
        player.open_shop(shop.clone());
        player.inventory.add(COINS, 1000, &ctx.world.defs);

        let price = shop.sale_price(7, &ctx.world.defs);
        shop_buy(&ctx, &player, &buy_frame(7, price + 1)).unwrap();

        assert_eq!(player.inventory.count_of(7), 0);
        assert_eq!(shop.entry(7).unwrap().amount, 5);
    }

    #[test]
    fn shop_actions_require_shopping_state() {
        let (ctx, player, _rt) = setup();
        player.inventory.add(COINS, 1000, &ctx.world.defs);
        shop_buy(&ctx, &player, &buy_frame(7, 130)).unwrap();
        assert_eq!(player.inventory.count_of(7), 0);
    }

    #[test]
    fn selling_pays_the_purchase_price() {
        let (ctx, player, _rt) = setup();
        let shop = Arc::new(Shop::new("General Store", [(7, 5)], 130, 40));
        player.open_shop(shop.clone());
        player.inventory.add(7, 1, &ctx.world.defs);

        let price = shop.purchase_price(7, &ctx.world.defs);
        shop_sell(&ctx, &player, &buy_frame(7, price)).unwrap();

        assert_eq!(player.inventory.count_of(7), 0);
        assert_eq!(player.inventory.count_of(COINS), price.max(0) as u32);
        assert_eq!(shop.entry(7).unwrap().amount, 6);
    }

    #[test]
    fn close_clears_shopping_state() {
        let (ctx, player, _rt) = setup();
        let shop = Arc::new(Shop::new("General Store", [], 130, 40));
        player.open_shop(shop);

        shop_close(&ctx, &player, &Frame::new(0, [])).unwrap();
        assert!(!player.states.has(state::SHOPPING));
    }
}
