use crate::{common::*, error::Error};

/// The `(height, width, channels)` shape shared by every image of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl ImageShape {
    pub fn new(height: usize, width: usize, channels: usize) -> Result<Self> {
        let shape = Self {
            height,
            width,
            channels,
        };
        shape.validate()?;
        Ok(shape)
    }

    pub fn validate(&self) -> Result<()> {
        let Self {
            height,
            width,
            channels,
        } = *self;
        if height == 0 || width == 0 || channels == 0 {
            return Err(Error::config(format!(
                "image shape {} must have non-zero dimensions",
                self
            )));
        }
        Ok(())
    }

    pub fn num_pixels(&self) -> usize {
        self.height * self.width
    }

    pub fn num_values(&self) -> usize {
        self.num_pixels() * self.channels
    }
}

impl std::fmt::Display for ImageShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.height, self.width, self.channels)
    }
}

/// The per-object feature layout shared by every example of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub num_objects: usize,
    #[serde(default)]
    pub num_attributes: usize,
}

impl FeatureSchema {
    pub fn new(num_objects: usize, num_attributes: usize) -> Result<Self> {
        let schema = Self {
            num_objects,
            num_attributes,
        };
        schema.validate()?;
        Ok(schema)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_objects == 0 {
            return Err(Error::config("num_objects must be positive, but get 0"));
        }
        Ok(())
    }

    /// The flattened feature length of one object.
    pub fn feature_dim(&self) -> usize {
        label::NUM_POSE_FEATURES + self.num_attributes
    }

    fn check_objects(&self, objects: &[ObjectFeatures]) -> Result<(), String> {
        if objects.len() != self.num_objects {
            return Err(format!(
                "expect {} objects, but found {}",
                self.num_objects,
                objects.len()
            ));
        }
        objects.iter().enumerate().try_for_each(|(nth, object)| {
            if object.attributes.len() != self.num_attributes {
                return Err(format!(
                    "object {} has {} attributes, but the schema declares {}",
                    nth,
                    object.attributes.len(),
                    self.num_attributes
                ));
            }
            if !(-PI..PI).contains(&object.orientation.raw()) {
                return Err(format!(
                    "object {} has orientation {} outside of [-π, π)",
                    nth, object.orientation
                ));
            }
            Ok(())
        })
    }
}

/// An image with row-major `(h, w, c)` pixel values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub shape: ImageShape,
    pub pixels: Vec<f32>,
}

impl Image {
    pub fn zeros(shape: ImageShape) -> Self {
        Self {
            shape,
            pixels: vec![0.0; shape.num_values()],
        }
    }
}

/// An example produced by the generator, before it has an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawExample {
    pub image: Image,
    #[serde(default)]
    pub mask: Option<Mask>,
    pub objects: Vec<ObjectFeatures>,
}

impl RawExample {
    /// Check the example against the declared shape and schema.
    pub fn check(&self, shape: &ImageShape, schema: &FeatureSchema) -> Result<(), String> {
        let Self {
            image,
            mask,
            objects,
        } = self;

        if image.shape != *shape {
            return Err(format!(
                "image shape {} does not match the declared shape {}",
                image.shape, shape
            ));
        }
        if image.pixels.len() != shape.num_values() {
            return Err(format!(
                "expect {} pixel values, but found {}",
                shape.num_values(),
                image.pixels.len()
            ));
        }
        if let Some(mask) = mask {
            if mask.height() != shape.height
                || mask.width() != shape.width
                || mask.classes().len() != shape.num_pixels()
            {
                return Err(format!(
                    "mask size ({}, {}) does not match the image size ({}, {})",
                    mask.height(),
                    mask.width(),
                    shape.height,
                    shape.width
                ));
            }
        }
        schema.check_objects(objects)
    }
}

/// An immutable example of the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub index: usize,
    pub image: Image,
    pub mask: Option<Mask>,
    pub objects: Vec<ObjectFeatures>,
}

impl Example {
    pub fn from_raw(index: usize, raw: RawExample) -> Self {
        let RawExample {
            image,
            mask,
            objects,
        } = raw;
        Self {
            index,
            image,
            mask,
            objects,
        }
    }

    /// The exact annotation carried by the example.
    pub fn ground_truth(&self) -> Label {
        Label::ground_truth(self.objects.clone(), self.mask.clone())
    }
}
