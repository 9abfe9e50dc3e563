//! Trigger tables: ordered `(predicate, action)` pairs per interaction
//! category. Lookup is a first-match scan in registration order; triggers
//! registered earlier always win, and nothing reorders them.
//!
//! Actions run on their own task while the player holds `Busy`; the
//! [`StateGuard`](crate::StateGuard) contract guarantees the bit is
//! released on every exit path.

use std::sync::Arc;

use crate::{GroundItem, Item, Npc, Object, Player};

/// The outcome of one evaluation of a deferred action.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ActionResult {
    /// The action ran (or decided nothing should run); stop re-evaluating.
    Completed,
    /// Preconditions not met yet; evaluate again next tick.
    NotReady,
    /// The target vanished or changed; drop silently.
    Aborted,
}

/// One registered trigger: a match predicate and the action to run.
pub struct Trigger<P: ?Sized, A: ?Sized> {
    pub predicate: Box<P>,
    pub action: Arc<A>,
}

/// An ordered trigger list for one category.
pub struct TriggerTable<P: ?Sized, A: ?Sized> {
    entries: Vec<Trigger<P, A>>,
}

impl<P: ?Sized, A: ?Sized> Default for TriggerTable<P, A> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<P: ?Sized, A: ?Sized> TriggerTable<P, A> {
    pub fn register(&mut self, predicate: Box<P>, action: Arc<A>) {
        self.entries.push(Trigger { predicate, action });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The first trigger whose predicate matches, in insertion order.
    pub fn find(&self, matches: impl Fn(&P) -> bool) -> Option<Arc<A>> {
        self.entries
            .iter()
            .find(|t| matches(&t.predicate))
            .map(|t| t.action.clone())
    }
}

pub type ObjectPredicate = dyn Fn(&Object, u8) -> bool + Send + Sync;
pub type ObjectAction = dyn Fn(Arc<Player>, Arc<Object>, u8) + Send + Sync;

pub type NpcPredicate = dyn Fn(&Npc) -> bool + Send + Sync;
pub type NpcTalkAction = dyn Fn(Arc<Player>, Arc<Npc>) + Send + Sync;
pub type NpcCombatAction = dyn Fn(Arc<Player>, Arc<Npc>) + Send + Sync;

pub type InvOnObjectPredicate = dyn Fn(&Object, &Item) -> bool + Send + Sync;
pub type InvOnObjectAction = dyn Fn(Arc<Player>, Arc<Object>, Item) + Send + Sync;

pub type InvOnPlayerPredicate = dyn Fn(&Item) -> bool + Send + Sync;
pub type InvOnPlayerAction = dyn Fn(Arc<Player>, Arc<Player>, Item) + Send + Sync;

pub type ItemPredicate = dyn Fn(&GroundItem) -> bool + Send + Sync;
pub type ItemAction = dyn Fn(Arc<Player>, Arc<GroundItem>) + Send + Sync;

/// Every trigger category. Registration happens once at startup from the
/// scripting host; the tables are scanned by the dispatcher afterwards.
#[derive(Default)]
pub struct Triggers {
    pub objects: TriggerTable<ObjectPredicate, ObjectAction>,
    pub boundaries: TriggerTable<ObjectPredicate, ObjectAction>,
    pub npc_talk: TriggerTable<NpcPredicate, NpcTalkAction>,
    pub inv_on_object: TriggerTable<InvOnObjectPredicate, InvOnObjectAction>,
    pub inv_on_boundary: TriggerTable<InvOnObjectPredicate, InvOnObjectAction>,
    pub inv_on_player: TriggerTable<InvOnPlayerPredicate, InvOnPlayerAction>,
    pub npc_attack: TriggerTable<NpcPredicate, NpcCombatAction>,
    pub npc_death: TriggerTable<NpcPredicate, NpcCombatAction>,
    pub items: TriggerTable<ItemPredicate, ItemAction>,
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::Location;

    #[test]
    fn first_registered_match_wins() {
        let hits = Arc::new(AtomicU32::new(0));
        let mut table: TriggerTable<ObjectPredicate, ObjectAction> = TriggerTable::default();

        for marker in [1_u32, 2] {
            let hits = hits.clone();
            table.register(
                Box::new(|obj, _| obj.id == 7),
                Arc::new(move |_, _, _| {
                    hits.store(marker, Ordering::SeqCst);
                }),
            );
        }

        let object = Object::new(7, 0, Location::new(0, 0), false);
        let action = table
            .find(|pred| pred(&object, 0))
            .expect("a trigger matches");

        let player = Arc::new(Player::new(
            0,
            1,
            &crate::PlayerProfile::default(),
            [127, 0, 0, 1].into(),
            false,
        ));
        action(player, Arc::new(object.clone()), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn no_match_yields_none() {
        let table: TriggerTable<ObjectPredicate, ObjectAction> = TriggerTable::default();
        let object = Object::new(3, 0, Location::new(0, 0), false);
        assert!(table.find(|pred| pred(&object, 0)).is_none());
    }
}
