/// Circular palm region in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PalmPosition {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

impl PalmPosition {
    pub fn new(x: f32, y: f32, radius: f32) -> Self {
        Self { x, y, radius }
    }

    pub fn distance_from_center(&self, px: f32, py: f32) -> f32 {
        let dx = px - self.x;
        let dy = py - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}
