use crate::common::*;

/// The number of leading entries of a flattened feature vector that are not
/// attributes: `y`, `x` and orientation.
pub const NUM_POSE_FEATURES: usize = 3;

/// The features of one object in an image.
///
/// Position is in pixel units with `[y, x]` order. Orientation is in radians
/// and always lies in `[-π, π)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectFeatures {
    pub position: [R64; 2],
    pub orientation: R64,
    pub attributes: Vec<R64>,
}

impl ObjectFeatures {
    pub fn new(y: R64, x: R64, orientation: R64, attributes: Vec<R64>) -> Self {
        Self {
            position: [y, x],
            orientation: wrap_angle(orientation),
            attributes,
        }
    }

    pub fn y(&self) -> R64 {
        self.position[0]
    }

    pub fn x(&self) -> R64 {
        self.position[1]
    }

    /// The length of the flattened feature vector.
    pub fn dim(&self) -> usize {
        NUM_POSE_FEATURES + self.attributes.len()
    }

    /// Flatten into `[y, x, orientation, attributes..]`.
    pub fn to_vec(&self) -> Vec<R64> {
        let [y, x] = self.position;
        let mut values = Vec::with_capacity(self.dim());
        values.extend([y, x, self.orientation]);
        values.extend(self.attributes.iter().cloned());
        values
    }

    /// Build from a flattened `[y, x, orientation, attributes..]` vector.
    pub fn from_slice(values: &[R64]) -> Result<Self> {
        ensure!(
            values.len() >= NUM_POSE_FEATURES,
            "expect at least {} features, but found {}",
            NUM_POSE_FEATURES,
            values.len()
        );
        let (pose, attributes) = values.split_at(NUM_POSE_FEATURES);
        Ok(Self::new(pose[0], pose[1], pose[2], attributes.to_vec()))
    }

    /// Euclidean distance between the positions of two objects.
    pub fn distance(&self, other: &ObjectFeatures) -> R64 {
        let dy = self.y() - other.y();
        let dx = self.x() - other.x();
        (dy * dy + dx * dx).sqrt()
    }

    /// Absolute orientation difference, accounting for wrap-around.
    pub fn orientation_error(&self, other: &ObjectFeatures) -> R64 {
        wrap_angle(self.orientation - other.orientation).abs()
    }
}

/// Wrap an angle in radians into `[-π, π)`.
pub fn wrap_angle(angle: R64) -> R64 {
    let two_pi = 2.0 * PI;
    let wrapped = (angle.raw() + PI).rem_euclid(two_pi) - PI;
    // rem_euclid may round up to exactly 2π for tiny negative inputs
    if wrapped >= PI {
        r64(wrapped - two_pi)
    } else {
        r64(wrapped)
    }
}
