//! Concrete pool policies: terrain zones, decorative forms, and sound
//! emitters.

mod forms;
mod tracks;
mod zones;

pub use forms::{Form, FormFactory, FormPolicy};
pub use tracks::{TrackPolicy, TrackResource, WakeRamp, proximity};
pub use zones::{Zone, ZoneCell, ZoneMaterializer, ZonePolicy};

/// Distance gate with hysteresis.
///
/// A candidate is admitted inside `enter`; once loaded it stays admitted
/// until it leaves `exit`. Compared on squared distances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusGate {
    enter: f32,
    exit: f32,
}

impl RadiusGate {
    /// `exit` is raised to `enter` if smaller.
    pub fn new(enter: f32, exit: f32) -> Self {
        Self {
            enter,
            exit: exit.max(enter),
        }
    }

    pub fn with_margin(enter: f32, margin: f32) -> Self {
        Self::new(enter, enter + margin.max(0.0))
    }

    pub fn enter(&self) -> f32 {
        self.enter
    }

    pub fn exit(&self) -> f32 {
        self.exit
    }

    /// Same gate with both radii multiplied by `factor`.
    pub fn scaled(&self, factor: f32) -> Self {
        Self::new(self.enter * factor, self.exit * factor)
    }

    pub fn admits(&self, distance_sq: f32, loaded: bool) -> bool {
        let radius = if loaded { self.exit } else { self.enter };
        distance_sq <= radius * radius
    }
}
