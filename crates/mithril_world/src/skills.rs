use std::sync::OnceLock;

use parking_lot::RwLock;

pub const SKILL_COUNT: usize = 18;

/// The fixed skill enumeration. Indexes are wire- and store-visible.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(usize)]
pub enum Skill {
    Attack,
    Defense,
    Strength,
    Hits,
    Ranged,
    Prayer,
    Magic,
    Cooking,
    Woodcutting,
    Fletching,
    Fishing,
    Firemaking,
    Crafting,
    Smithing,
    Mining,
    Herblaw,
    Agility,
    Thieving,
}

impl Skill {
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// The skill at a wire/store index, if in range.
pub fn skill_by_index(index: usize) -> Option<Skill> {
    use Skill::*;
    const ORDER: [Skill; SKILL_COUNT] = [
        Attack,
        Defense,
        Strength,
        Hits,
        Ranged,
        Prayer,
        Magic,
        Cooking,
        Woodcutting,
        Fletching,
        Fishing,
        Firemaking,
        Crafting,
        Smithing,
        Mining,
        Herblaw,
        Agility,
        Thieving,
    ];
    ORDER.get(index).copied()
}

struct Stats {
    current: [i32; SKILL_COUNT],
    maximum: [i32; SKILL_COUNT],
    experience: [i64; SKILL_COUNT],
}

/// A mob's skill table. All reads and writes go through one reader/writer
/// lock so cross-skill derived values (combat level) see a consistent
/// snapshot.
pub struct SkillTable {
    stats: RwLock<Stats>,
}

impl Default for SkillTable {
    fn default() -> Self {
        let mut stats = Stats {
            current: [1; SKILL_COUNT],
            maximum: [1; SKILL_COUNT],
            experience: [0; SKILL_COUNT],
        };
        // Fresh mobs start with 10 hits.
        stats.current[Skill::Hits.index()] = 10;
        stats.maximum[Skill::Hits.index()] = 10;
        Self {
            stats: RwLock::new(stats),
        }
    }
}

impl SkillTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self, skill: Skill) -> i32 {
        self.stats.read().current[skill.index()]
    }

    pub fn maximum(&self, skill: Skill) -> i32 {
        self.stats.read().maximum[skill.index()]
    }

    pub fn experience(&self, skill: Skill) -> i64 {
        self.stats.read().experience[skill.index()]
    }

    pub fn set_current(&self, skill: Skill, value: i32) {
        self.stats.write().current[skill.index()] = value;
    }

    pub fn set_maximum(&self, skill: Skill, value: i32) {
        self.stats.write().maximum[skill.index()] = value;
    }

    pub fn set_experience(&self, skill: Skill, value: i64) {
        self.stats.write().experience[skill.index()] = value;
    }

    pub fn decrease_current(&self, skill: Skill, delta: i32) {
        self.stats.write().current[skill.index()] -= delta;
    }

    pub fn increase_current(&self, skill: Skill, delta: i32) {
        self.stats.write().current[skill.index()] += delta;
    }

    /// Adds experience and raises the maximum (and current, by the same
    /// delta) when a level boundary is crossed.
    pub fn add_experience(&self, skill: Skill, delta: i64) {
        let mut stats = self.stats.write();
        let i = skill.index();
        stats.experience[i] += delta;
        let level = experience_to_level(stats.experience[i]);
        if level > stats.maximum[i] {
            let gained = level - stats.maximum[i];
            stats.maximum[i] = level;
            stats.current[i] += gained;
        }
    }

    /// Loads one skill row from the profile store.
    pub fn set_all(&self, skill: Skill, current: i32, maximum: i32, experience: i64) {
        let mut stats = self.stats.write();
        let i = skill.index();
        stats.current[i] = current;
        stats.maximum[i] = maximum;
        stats.experience[i] = experience;
    }

    pub fn snapshot(&self) -> Vec<(i32, i32, i64)> {
        let stats = self.stats.read();
        (0..SKILL_COUNT)
            .map(|i| (stats.current[i], stats.maximum[i], stats.experience[i]))
            .collect()
    }

    /// The combat level derived from skill maxima.
    pub fn combat_level(&self) -> i32 {
        let stats = self.stats.read();
        let max = |s: Skill| stats.maximum[s.index()] as f32;

        let aggressive = max(Skill::Attack) + max(Skill::Strength);
        let defensive = max(Skill::Defense) + max(Skill::Hits);
        let spiritual =
            ((stats.maximum[Skill::Prayer.index()] + stats.maximum[Skill::Magic.index()]) / 8) as f32;
        let ranged = max(Skill::Ranged);

        if aggressive < ranged * 1.5 {
            (defensive / 4.0 + ranged * 0.375 + spiritual) as i32
        } else {
            (aggressive / 4.0 + defensive / 4.0 + spiritual) as i32
        }
    }
}

/// Experience thresholds for 104 levels, built once at first use.
fn experience_table() -> &'static [i64; 104] {
    static TABLE: OnceLock<[i64; 104]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0_i64; 104];
        let mut accumulated = 0_i64;
        for (lvl, slot) in table.iter_mut().enumerate() {
            let k = (lvl + 1) as f64;
            accumulated += (k + 300.0 * 2_f64.powf(k / 7.0)) as i64;
            *slot = (accumulated & !3) / 4;
        }
        table
    })
}

/// The experience required to hold `level`. Level 1 and out-of-range input
/// cost nothing.
pub fn level_to_experience(level: i32) -> i64 {
    let Ok(index) = usize::try_from(level - 2) else {
        return 0;
    };
    if index >= 104 {
        return 0;
    }
    experience_table()[index]
}

/// The maximum level the given experience supports, capped at 99.
pub fn experience_to_level(experience: i64) -> i32 {
    for (lvl, &threshold) in experience_table().iter().enumerate() {
        if experience < threshold {
            return lvl as i32 + 1;
        }
    }
    99
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn experience_boundaries() {
        assert_eq!(level_to_experience(1), 0);
        assert_eq!(level_to_experience(2), 83);
        assert_eq!(level_to_experience(99), 13_034_431);
    }

    #[test]
    fn level_experience_round_trip() {
        for level in 2..=99 {
            assert_eq!(experience_to_level(level_to_experience(level)), level);
        }
    }

    #[test]
    fn combat_level_is_deterministic() {
        let skills = SkillTable::new();
        skills.set_maximum(Skill::Attack, 40);
        skills.set_maximum(Skill::Strength, 40);
        skills.set_maximum(Skill::Defense, 40);
        skills.set_maximum(Skill::Hits, 40);
        skills.set_maximum(Skill::Prayer, 16);
        skills.set_maximum(Skill::Magic, 16);

        let level = skills.combat_level();
        assert_eq!(level, skills.combat_level());
        // (40+40)/4 + (40+40)/4 + (16+16)/8 = 20 + 20 + 4.
        assert_eq!(level, 44);
    }

    #[test]
    fn ranged_build_uses_ranged_formula() {
        let skills = SkillTable::new();
        skills.set_maximum(Skill::Ranged, 60);
        skills.set_maximum(Skill::Defense, 40);
        skills.set_maximum(Skill::Hits, 40);

        // aggressive = 2 < 90, so: (40+40)/4 + 60*0.375 + 0 = 20 + 22.5.
        assert_eq!(skills.combat_level(), 42);
    }

    #[test]
    fn add_experience_levels_up() {
        let skills = SkillTable::new();
        skills.add_experience(Skill::Woodcutting, level_to_experience(10));
        assert_eq!(skills.maximum(Skill::Woodcutting), 10);
        assert_eq!(skills.current(Skill::Woodcutting), 10);
        assert!(skills.current(Skill::Woodcutting) <= skills.maximum(Skill::Woodcutting));
    }
}
