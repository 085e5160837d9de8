/// Radial alpha mask softening the edge of the palm circle.
///
/// Opaque up to `inner × radius`, then a gradient band out to the radius with stops
/// `(0.0, 1.0)`, `(0.8, 0.8)` and `(1.0, 0.0)`. Zero at and beyond the radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatherMask {
    inner: f32,
}

const GRADIENT_STOPS: [(f32, f32); 3] = [(0.0, 1.0), (0.8, 0.8), (1.0, 0.0)];

impl Default for FeatherMask {
    fn default() -> Self {
        Self { inner: 0.7 }
    }
}

impl FeatherMask {
    pub fn new(inner: f32) -> Self {
        Self {
            inner: inner.clamp(0.0, 1.0),
        }
    }

    pub fn inner(&self) -> f32 {
        self.inner
    }

    /// Coverage in `[0, 1]` at `distance` from the center of a circle of `radius`.
    pub fn alpha(&self, distance: f32, radius: f32) -> f32 {
        if radius <= 0.0 || distance >= radius {
            return 0.0;
        }

        let inner_radius = radius * self.inner;
        if distance <= inner_radius {
            return 1.0;
        }

        let t = (distance - inner_radius) / (radius - inner_radius);
        gradient_at(t)
    }
}

fn gradient_at(t: f32) -> f32 {
    for pair in GRADIENT_STOPS.windows(2) {
        let (t0, a0) = pair[0];
        let (t1, a1) = pair[1];
        if t <= t1 {
            let local = (t - t0) / (t1 - t0);
            return a0 + (a1 - a0) * local;
        }
    }
    0.0
}
