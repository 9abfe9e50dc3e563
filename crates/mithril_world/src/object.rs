use crate::{Definitions, Direction, Location};

/// A scenery or boundary entity. Scenery occupies a footprint from its
/// definition; a boundary occupies one edge between two tiles. At most one
/// object exists per `(x, y, boundary)` triple.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Object {
    pub id: u32,
    pub loc: Location,
    pub direction: u8,
    pub boundary: bool,
}

impl Object {
    pub fn new(id: u32, direction: u8, loc: Location, boundary: bool) -> Self {
        Self {
            id,
            loc,
            direction,
            boundary,
        }
    }

    /// The edge a boundary occupies, derived from its direction field.
    pub fn boundary_edge(&self) -> Direction {
        match self.direction {
            0 => Direction::North,
            1 => Direction::East,
            2 => Direction::NorthEast,
            _ => Direction::NorthWest,
        }
    }

    /// The two endpoint tiles of a boundary: its own tile and the neighbour
    /// across the occupied edge.
    pub fn boundary_endpoints(&self) -> (Location, Location) {
        let (dx, dy) = self.boundary_edge().delta();
        (self.loc, self.loc.translate(dx, dy))
    }

    /// The scenery footprint `(width, height)` from the definition bundle.
    pub fn footprint(&self, defs: &Definitions) -> (i32, i32) {
        defs.object(self.id)
            .map_or((1, 1), |d| (d.width.max(1), d.height.max(1)))
    }
}
