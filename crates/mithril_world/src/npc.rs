use std::sync::atomic::{AtomicI32, Ordering};

use parking_lot::Mutex;

use crate::{
    CollisionMap, Definitions, Direction, HasStates, Location, MobRef, Mobile, Skill, SkillTable,
    States,
};

/// A non-player mob. NPCs are created from spawn records at world load and
/// live for the whole server run, wandering inside their box or chasing a
/// target player.
pub struct Npc {
    pub index: usize,
    pub generation: u64,
    pub id: u32,
    pub spawn: Location,
    /// Inclusive wander box corners.
    pub min: Location,
    pub max: Location,

    pub mobile: Mobile,
    pub skills: SkillTable,
    pub states: States,

    /// Remaining wander tiles.
    steps: AtomicI32,
    /// Cooldown before the next wander can begin.
    ticks: AtomicI32,
    wander_dir: Mutex<Direction>,
    target: Mutex<Option<MobRef>>,
}

impl Npc {
    pub fn new(
        index: usize,
        generation: u64,
        id: u32,
        spawn: Location,
        min: Location,
        max: Location,
        defs: &Definitions,
    ) -> Self {
        let skills = SkillTable::new();
        if let Some(def) = defs.npc(id) {
            skills.set_all(Skill::Attack, def.attack, def.attack, 0);
            skills.set_all(Skill::Strength, def.strength, def.strength, 0);
            skills.set_all(Skill::Defense, def.defense, def.defense, 0);
            skills.set_all(Skill::Hits, def.hits, def.hits, 0);
        }

        Self {
            index,
            generation,
            id,
            spawn,
            min,
            max,
            mobile: Mobile::at(spawn),
            skills,
            states: States::new(),
            steps: AtomicI32::new(0),
            ticks: AtomicI32::new(0),
            wander_dir: Mutex::new(Direction::North),
            target: Mutex::new(None),
        }
    }

    pub fn name<'a>(&self, defs: &'a Definitions) -> &'a str {
        defs.npc(self.id).map_or("nothing", |d| d.name.as_str())
    }

    pub fn aggressive(&self, defs: &Definitions) -> bool {
        defs.npc(self.id).is_some_and(|d| d.aggressive())
    }

    pub fn steps(&self) -> i32 {
        self.steps.load(Ordering::SeqCst)
    }

    pub fn ticks(&self) -> i32 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Idle enough to roll for a new wander.
    pub fn wander_idle(&self) -> bool {
        self.steps() <= 0 && self.ticks() <= 0
    }

    pub fn begin_wander(&self, steps: i32, ticks: i32) {
        self.steps.store(steps, Ordering::SeqCst);
        self.ticks.store(ticks, Ordering::SeqCst);
    }

    /// One wander tick: runs the cooldown down and takes at most one step
    /// inside the box. Returns `(from, to)` when the NPC moved.
    pub fn advance_wander(&self, collision: &CollisionMap) -> Option<(Location, Location)> {
        if self.ticks() > 0 {
            self.ticks.fetch_sub(1, Ordering::SeqCst);
        }
        if self.steps() <= 0 {
            return None;
        }
        self.steps.fetch_sub(1, Ordering::SeqCst);
        self.wander_step(collision)
    }

    /// Keeps the current heading until the box edge or a wall forces a
    /// rotation.
    fn wander_step(&self, collision: &CollisionMap) -> Option<(Location, Location)> {
        const HEADINGS: [Direction; 4] = [
            Direction::North,
            Direction::East,
            Direction::South,
            Direction::West,
        ];

        let from = self.mobile.loc();
        let mut dir = *self.wander_dir.lock();

        for _ in 0..HEADINGS.len() {
            let (dx, dy) = dir.delta();
            let to = from.translate(dx, dy);
            if self.in_box(to) && collision.step_allowed(from, dir) {
                *self.wander_dir.lock() = dir;
                self.mobile.set_loc(to);
                self.mobile.set_direction(dir);
                return Some((from, to));
            }
            let next = HEADINGS
                .iter()
                .position(|&h| h == dir)
                .map_or(0, |i| (i + 1) % HEADINGS.len());
            dir = HEADINGS[next];
        }

        None
    }

    pub fn in_box(&self, loc: Location) -> bool {
        loc.x >= self.min.x && loc.x <= self.max.x && loc.y >= self.min.y && loc.y <= self.max.y
    }

    pub fn target(&self) -> Option<MobRef> {
        *self.target.lock()
    }

    pub fn acquire_target(&self, target: MobRef) {
        *self.target.lock() = Some(target);
    }

    pub fn clear_target(&self) {
        *self.target.lock() = None;
    }

    pub fn busy(&self) -> bool {
        self.states.busy()
    }
}

impl HasStates for Npc {
    fn states(&self) -> &States {
        &self.states
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn npc_at(x: i32, y: i32) -> Npc {
        Npc::new(
            0,
            1,
            0,
            Location::new(x, y),
            Location::new(10, 10),
            Location::new(14, 14),
            &Definitions::default(),
        )
    }

    #[test]
    fn wander_scenario() {
        let collision = CollisionMap::new();
        let npc = npc_at(12, 12);

        npc.begin_wander(5, 30);
        for _ in 0..5 {
            let moved = npc.advance_wander(&collision);
            let (_, to) = moved.expect("a wandering npc steps every tick");
            assert!(npc.in_box(to));
        }

        assert_eq!(npc.steps(), 0);
        assert_eq!(npc.ticks(), 25);
        assert_ne!(npc.mobile.loc(), Location::new(12, 12));
    }

    #[test]
    fn wander_stays_inside_the_box() {
        let collision = CollisionMap::new();
        let npc = npc_at(14, 14);

        npc.begin_wander(40, 40);
        for _ in 0..40 {
            npc.advance_wander(&collision);
            assert!(npc.in_box(npc.mobile.loc()));
        }
    }

    #[test]
    fn idle_only_after_cooldown() {
        let collision = CollisionMap::new();
        let npc = npc_at(12, 12);
        assert!(npc.wander_idle());

        npc.begin_wander(2, 3);
        assert!(!npc.wander_idle());

        for _ in 0..3 {
            npc.advance_wander(&collision);
        }
        assert!(npc.wander_idle());
    }
}
