/// A player's visual appearance: sprite indices and colours sent in the
/// appearance broadcast.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AppearanceTable {
    pub head: i32,
    pub body: i32,
    pub legs: i32,
    pub male: bool,
    pub head_color: i32,
    pub body_color: i32,
    pub legs_color: i32,
    pub skin_color: i32,
}

impl AppearanceTable {
    pub fn new(head: i32, body: i32, male: bool, hair: i32, top: i32, bottom: i32, skin: i32) -> Self {
        // Only one legs sprite exists.
        Self {
            head,
            body,
            legs: 3,
            male,
            head_color: hair,
            body_color: top,
            legs_color: bottom,
            skin_color: skin,
        }
    }
}

impl Default for AppearanceTable {
    fn default() -> Self {
        Self::new(1, 2, true, 2, 8, 14, 0)
    }
}
