use crate::common::*;

/// The label noise options of the simulated annotator.
///
/// The default profile is noiseless.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoiseProfile {
    /// Standard deviation of the Gaussian jitter on object positions in pixels.
    #[serde(default = "zero")]
    pub position_sigma: R64,
    /// Standard deviation of the Gaussian jitter on orientations in radians.
    #[serde(default = "zero")]
    pub orientation_sigma: R64,
    /// The probability that an object is omitted from the label.
    #[serde(default = "zero")]
    pub miss_rate: R64,
    /// The probability, per declared object, that a spurious object is added.
    #[serde(default = "zero")]
    pub false_positive_rate: R64,
}

impl NoiseProfile {
    pub fn noiseless() -> Self {
        Self {
            position_sigma: zero(),
            orientation_sigma: zero(),
            miss_rate: zero(),
            false_positive_rate: zero(),
        }
    }

    pub fn is_noiseless(&self) -> bool {
        *self == Self::noiseless()
    }

    pub fn validate(&self) -> Result<()> {
        let Self {
            position_sigma,
            orientation_sigma,
            miss_rate,
            false_positive_rate,
        } = *self;

        ensure!(
            position_sigma >= 0.0,
            "position_sigma must be non-negative, but get {}",
            position_sigma
        );
        ensure!(
            orientation_sigma >= 0.0,
            "orientation_sigma must be non-negative, but get {}",
            orientation_sigma
        );
        ensure!(
            (0.0..=1.0).contains(&miss_rate.raw()),
            "miss_rate must be within [0, 1], but get {}",
            miss_rate
        );
        ensure!(
            (0.0..=1.0).contains(&false_positive_rate.raw()),
            "false_positive_rate must be within [0, 1], but get {}",
            false_positive_rate
        );
        Ok(())
    }
}

impl Default for NoiseProfile {
    fn default() -> Self {
        Self::noiseless()
    }
}

fn zero() -> R64 {
    r64(0.0)
}
