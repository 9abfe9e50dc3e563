/// Tiles per logical floor. `y / PLANE_HEIGHT` is the plane index.
pub const PLANE_HEIGHT: i32 = 944;

/// An integer tile coordinate on the world grid.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
pub struct Location {
    pub x: i32,
    pub y: i32,
}

impl Location {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The logical floor this tile is on.
    pub fn plane(self) -> i32 {
        self.y / PLANE_HEIGHT
    }

    pub fn translate(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Chebyshev distance: the number of steps when diagonals count as one.
    pub fn chebyshev(self, other: Self) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    /// Squared euclidean distance, used for aggro range checks.
    pub fn euclidean_sq(self, other: Self) -> i64 {
        let dx = i64::from(self.x - other.x);
        let dy = i64::from(self.y - other.y);
        dx * dx + dy * dy
    }

    pub fn within_range(self, other: Self, radius: i32) -> bool {
        self.chebyshev(other) <= radius
    }

    /// True if this tile is adjacent (including diagonally) to the rectangle
    /// spanning `min..min + (width, height)`, or inside it.
    pub fn within_rect_range(self, min: Self, width: i32, height: i32, radius: i32) -> bool {
        let dx = (min.x - self.x).max(self.x - (min.x + width - 1)).max(0);
        let dy = (min.y - self.y).max(self.y - (min.y + height - 1)).max(0);
        dx.max(dy) <= radius
    }

    /// The facing direction from this tile toward `other`. Self-to-self is
    /// north.
    pub fn direction_to(self, other: Self) -> Direction {
        Direction::between(self, other)
    }
}

impl From<(i32, i32)> for Location {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// One of the eight facing/step directions.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Direction {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Direction {
    /// The unit step this direction maps to. North is `+y`, east is `+x`.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Self::North => (0, 1),
            Self::NorthEast => (1, 1),
            Self::East => (1, 0),
            Self::SouthEast => (1, -1),
            Self::South => (0, -1),
            Self::SouthWest => (-1, -1),
            Self::West => (-1, 0),
            Self::NorthWest => (-1, 1),
        }
    }

    pub fn between(from: Location, to: Location) -> Self {
        let dx = (to.x - from.x).signum();
        let dy = (to.y - from.y).signum();
        match (dx, dy) {
            (0, 1) | (0, 0) => Self::North,
            (1, 1) => Self::NorthEast,
            (1, 0) => Self::East,
            (1, -1) => Self::SouthEast,
            (0, -1) => Self::South,
            (-1, -1) => Self::SouthWest,
            (-1, 0) => Self::West,
            _ => Self::NorthWest,
        }
    }

    pub fn sprite(self) -> u8 {
        match self {
            Self::North => 0,
            Self::NorthEast => 1,
            Self::East => 2,
            Self::SouthEast => 3,
            Self::South => 4,
            Self::SouthWest => 5,
            Self::West => 6,
            Self::NorthWest => 7,
        }
    }
}

/// Hashes a username the way the wire protocol and the profile store key
/// players: base-37 over the first twelve characters.
pub fn base37(name: &str) -> u64 {
    let mut hash = 0_u64;
    for c in name.chars().take(12) {
        hash = hash.wrapping_mul(37);
        match c {
            'a'..='z' => hash += c as u64 - 'a' as u64 + 1,
            'A'..='Z' => hash += c as u64 - 'A' as u64 + 1,
            '0'..='9' => hash += c as u64 - '0' as u64 + 27,
            _ => {}
        }
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_derivation() {
        assert_eq!(Location::new(100, 100).plane(), 0);
        assert_eq!(Location::new(100, PLANE_HEIGHT).plane(), 1);
        assert_eq!(Location::new(100, PLANE_HEIGHT * 3 + 5).plane(), 3);
    }

    #[test]
    fn chebyshev_counts_diagonals_once() {
        let a = Location::new(10, 10);
        assert_eq!(a.chebyshev(Location::new(13, 12)), 3);
        assert_eq!(a.chebyshev(a), 0);
    }

    #[test]
    fn rect_range_touches_footprint() {
        // A 2x2 footprint at (5, 5).
        let min = Location::new(5, 5);
        assert!(Location::new(4, 4).within_rect_range(min, 2, 2, 1));
        assert!(Location::new(7, 6).within_rect_range(min, 2, 2, 1));
        assert!(Location::new(5, 5).within_rect_range(min, 2, 2, 1));
        assert!(!Location::new(8, 5).within_rect_range(min, 2, 2, 1));
    }

    #[test]
    fn base37_ignores_case_and_truncates() {
        assert_eq!(base37("Alice"), base37("alice"));
        assert_ne!(base37("alice"), base37("bob"));
        assert_eq!(base37("abcdefghijkl"), base37("abcdefghijklxyz"));
    }
}
