use std::collections::VecDeque;

use crate::{CollisionMap, Direction, Location};

/// An ordered waypoint queue. The tick advances a mob at most one step (two
/// when running) toward the front waypoint; steps are recomputed lazily
/// against the collision masks as the mob moves.
#[derive(Default, Debug)]
pub struct Path {
    waypoints: VecDeque<Location>,
}

impl Path {
    pub fn to(target: Location) -> Self {
        Self {
            waypoints: VecDeque::from([target]),
        }
    }

    pub fn with_waypoints(waypoints: impl IntoIterator<Item = Location>) -> Self {
        Self {
            waypoints: waypoints.into_iter().collect(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn target(&self) -> Option<Location> {
        self.waypoints.front().copied()
    }

    /// Computes the next tile on the way to the current waypoint, consuming
    /// waypoints as they are reached. `None` means no legal step exists this
    /// tick (arrived, or walled off).
    pub fn next_step(&mut self, collision: &CollisionMap, from: Location) -> Option<Location> {
        loop {
            let target = *self.waypoints.front()?;
            if target == from {
                self.waypoints.pop_front();
                continue;
            }
            return match step_toward(collision, from, target) {
                Some(next) => Some(next),
                None => {
                    // Walled off; abandon the rest of the path.
                    self.waypoints.clear();
                    None
                }
            };
        }
    }
}

/// The single step from `from` that reduces Chebyshev distance to `target`,
/// subject to the collision mask on the step's edges. Prefers the diagonal,
/// then each of its cardinal components.
pub(crate) fn step_toward(
    collision: &CollisionMap,
    from: Location,
    target: Location,
) -> Option<Location> {
    let dx = (target.x - from.x).signum();
    let dy = (target.y - from.y).signum();

    let mut candidates = [None::<(i32, i32)>; 3];
    if dx != 0 && dy != 0 {
        candidates = [Some((dx, dy)), Some((dx, 0)), Some((0, dy))];
    } else if dx != 0 {
        candidates[0] = Some((dx, 0));
    } else if dy != 0 {
        candidates[0] = Some((0, dy));
    }

    for (sx, sy) in candidates.into_iter().flatten() {
        let dir = Direction::between(from, from.translate(sx, sy));
        if collision.step_allowed(from, dir) {
            return Some(from.translate(sx, sy));
        }
    }

    None
}
