use std::sync::Arc;

use parking_lot::RwLock;

/// A weak reference into a [`Registry`]: slot index plus the generation the
/// slot held when the reference was taken. Dereferencing after the occupant
/// left (and possibly a newcomer took the slot) yields `None`, so stale
/// targets never pin or confuse live entities.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MobRef {
    pub index: usize,
    pub generation: u64,
}

struct Slot<T> {
    value: Arc<T>,
    generation: u64,
}

/// A read-many slot registry. Range operations take the read lock and may
/// run in parallel; add/remove take the write lock and only happen in the
/// tick's intake and logout phases.
pub struct Registry<T> {
    slots: RwLock<Vec<Option<Slot<T>>>>,
    next_generation: RwLock<u64>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
            next_generation: RwLock::new(1),
        }
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a slot and builds the occupant with its index and
    /// generation. Returns the shared occupant.
    pub fn insert_with(&self, build: impl FnOnce(usize, u64) -> T) -> Arc<T> {
        let mut slots = self.slots.write();
        let generation = {
            let mut next = self.next_generation.write();
            let g = *next;
            *next += 1;
            g
        };

        let index = slots.iter().position(Option::is_none).unwrap_or_else(|| {
            slots.push(None);
            slots.len() - 1
        });

        let value = Arc::new(build(index, generation));
        slots[index] = Some(Slot {
            value: value.clone(),
            generation,
        });
        value
    }

    pub fn remove(&self, index: usize) -> Option<Arc<T>> {
        self.slots
            .write()
            .get_mut(index)
            .and_then(Option::take)
            .map(|slot| slot.value)
    }

    pub fn get(&self, index: usize) -> Option<Arc<T>> {
        self.slots
            .read()
            .get(index)
            .and_then(Option::as_ref)
            .map(|slot| slot.value.clone())
    }

    /// Dereferences a weak reference; `None` when the generation no longer
    /// matches.
    pub fn deref(&self, mob_ref: MobRef) -> Option<Arc<T>> {
        self.slots
            .read()
            .get(mob_ref.index)
            .and_then(Option::as_ref)
            .filter(|slot| slot.generation == mob_ref.generation)
            .map(|slot| slot.value.clone())
    }

    pub fn len(&self) -> usize {
        self.slots.read().iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A consistent snapshot of every occupant, for parallel fan-out.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.slots
            .read()
            .iter()
            .flatten()
            .map(|slot| slot.value.clone())
            .collect()
    }

    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Option<Arc<T>> {
        self.slots
            .read()
            .iter()
            .flatten()
            .find(|slot| pred(&slot.value))
            .map(|slot| slot.value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_refs_do_not_resolve() {
        let registry: Registry<&str> = Registry::new();

        let a = registry.insert_with(|_, _| "a");
        let a_ref = MobRef {
            index: 0,
            generation: 1,
        };
        assert_eq!(registry.deref(a_ref).as_deref(), Some(&"a"));

        registry.remove(0);
        assert_eq!(registry.deref(a_ref), None);

        // The slot is reused with a new generation; the old ref stays dead.
        let _b = registry.insert_with(|index, generation| {
            assert_eq!(index, 0);
            assert!(generation > 1);
            "b"
        });
        assert_eq!(registry.deref(a_ref), None);
        drop(a);
    }

    #[test]
    fn snapshot_skips_empty_slots() {
        let registry: Registry<u32> = Registry::new();
        registry.insert_with(|_, _| 1);
        registry.insert_with(|_, _| 2);
        registry.remove(0);

        assert_eq!(registry.snapshot(), vec![Arc::new(2)]);
        assert_eq!(registry.len(), 1);
    }
}
