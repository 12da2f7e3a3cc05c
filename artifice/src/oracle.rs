//! The simulated annotator.
//!
//! Labels are a pure function of the example, the noise profile, the region
//! constraint and the seed. The oracle only ever sees the example it is asked
//! to label.

use crate::{
    common::*,
    dataset::{Example, Region},
    error::Error,
    utils,
};

/// The annotator that labels examples with controlled noise.
#[derive(Debug, Clone)]
pub struct Oracle {
    profile: NoiseProfile,
    region: Option<Region>,
}

impl Oracle {
    pub fn new(profile: NoiseProfile, region: Option<Region>) -> Result<Self> {
        profile
            .validate()
            .map_err(|err| Error::config(format!("bad noise profile: {}", err)))?;
        Ok(Self { profile, region })
    }

    pub fn profile(&self) -> &NoiseProfile {
        &self.profile
    }

    /// Label one example.
    pub fn label(&self, example: &Example, seed: u64) -> Label {
        let Self { profile, region } = self;
        let mut rng = utils::seeded_rng(seed, example.index as u64);

        let mut objects: Vec<ObjectFeatures> = example
            .objects
            .iter()
            .filter_map(|object| {
                // draw order is fixed so that labels are reproducible
                let missed = rng.gen::<f64>() < profile.miss_rate.raw();
                let dy = utils::sample_normal(&mut rng, 0.0, 1.0);
                let dx = utils::sample_normal(&mut rng, 0.0, 1.0);
                let dtheta = utils::sample_normal(&mut rng, 0.0, 1.0);

                if missed {
                    return None;
                }

                let mut object = object.clone();
                if profile.position_sigma > 0.0 {
                    let sigma = profile.position_sigma.raw();
                    object.position = [
                        object.y() + r64(dy * sigma),
                        object.x() + r64(dx * sigma),
                    ];
                }
                if profile.orientation_sigma > 0.0 {
                    let sigma = profile.orientation_sigma.raw();
                    object.orientation = label::wrap_angle(object.orientation + dtheta * sigma);
                }
                Some(object)
            })
            .collect();

        // spurious objects
        let shape = example.image.shape;
        let area = region.unwrap_or_else(|| Region::new(0, 0, shape.height, shape.width));
        let num_attributes = example
            .objects
            .first()
            .map(|object| object.attributes.len())
            .unwrap_or(0);

        for _ in 0..example.objects.len() {
            let spurious = rng.gen::<f64>() < profile.false_positive_rate.raw();
            let y = rng.gen_range(area.top as f64..area.bottom as f64);
            let x = rng.gen_range(area.left as f64..area.right as f64);
            let orientation = rng.gen_range(-PI..PI);

            if spurious {
                objects.push(ObjectFeatures::new(
                    r64(y),
                    r64(x),
                    r64(orientation),
                    vec![r64(0.0); num_attributes],
                ));
            }
        }

        let mut mask = example.mask.clone();

        if let Some(region) = region {
            objects.retain(|object| region.contains(object.y(), object.x()));
            if let Some(mask) = &mut mask {
                mask.retain_region(region.rows(), region.cols());
            }
        }

        Label {
            source: LabelSource::Oracle {
                profile: profile.clone(),
                seed,
            },
            objects,
            mask,
        }
    }

    /// Label a batch of examples in parallel.
    pub fn label_batch(&self, examples: &[Example], seed: u64) -> Vec<(usize, Label)> {
        examples
            .par_iter()
            .map(|example| (example.index, self.label(example, seed)))
            .collect()
    }
}

/// Label an example without a region constraint.
pub fn simulate_label(example: &Example, profile: &NoiseProfile, seed: u64) -> Result<Label> {
    Ok(Oracle::new(profile.clone(), None)?.label(example, seed))
}
