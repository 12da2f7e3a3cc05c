use super::{
    Example, FeatureSchema, ImageShape, RawExample, Region, Split, StoreHeader, FORMAT_VERSION,
    MAGIC,
};
use crate::{common::*, error::Error, utils};

const HEADER_FILE: &str = "header.bin";
const EXAMPLES_DIR: &str = "examples";
const LABELS_DIR: &str = "labels";

/// Builds a record store from the examples produced by the generator.
#[derive(Debug, Clone)]
pub struct RecordStoreInit<I> {
    pub image_shape: ImageShape,
    pub schema: FeatureSchema,
    pub split: Split,
    pub region: Option<Region>,
    /// Replace an existing store at the output path.
    pub overwrite: bool,
    pub examples: I,
}

impl<I> RecordStoreInit<I>
where
    I: IntoIterator<Item = Result<RawExample>>,
{
    /// Validate and write every example, then publish the store at `path`.
    ///
    /// The examples are written into a staging directory which is renamed
    /// into place only if the whole conversion succeeds.
    pub fn write(self, path: impl AsRef<Path>) -> Result<RecordStore> {
        let path = path.as_ref();
        let Self {
            image_shape,
            schema,
            split,
            region,
            overwrite,
            examples,
        } = self;

        // reject bad options before touching the file system
        image_shape.validate()?;
        schema.validate()?;
        if let Some(region) = &region {
            region.validate(&image_shape)?;
        }
        if path.exists() && !overwrite {
            return Err(Error::config(format!(
                "'{}' already exists, set overwrite to replace it",
                path.display()
            )));
        }

        let staging_dir = staging_path(path)?;
        if staging_dir.exists() {
            fs::remove_dir_all(&staging_dir)?;
        }

        let result = (|| -> Result<StoreHeader> {
            fs::create_dir_all(staging_dir.join(EXAMPLES_DIR))?;
            fs::create_dir_all(staging_dir.join(LABELS_DIR))?;

            let mut num_examples = 0;

            for (index, raw) in examples.into_iter().enumerate() {
                let raw = raw.with_context(|| format!("failed to load raw example {}", index))?;
                raw.check(&image_shape, &schema)
                    .map_err(|reason| Error::schema(format!("example {}: {}", index, reason)))?;

                let example = Example::from_raw(index, raw);
                let bytes = bincode::serialize(&example)?;
                fs::write(staging_dir.join(EXAMPLES_DIR).join(file_name(index)), bytes)?;

                num_examples += 1;
                if num_examples % 1000 == 0 {
                    debug!("converted {} examples", num_examples);
                }
            }

            split.validate(num_examples)?;

            let header = StoreHeader {
                magic: MAGIC,
                version: FORMAT_VERSION,
                image_shape,
                schema,
                split,
                region,
                num_examples,
            };
            fs::write(staging_dir.join(HEADER_FILE), bincode::serialize(&header)?)?;
            Ok(header)
        })();

        let header = match result {
            Ok(header) => header,
            Err(err) => {
                let _ = fs::remove_dir_all(&staging_dir);
                return Err(err);
            }
        };

        // publish
        if path.exists() {
            warn!("overwrite existing record store '{}'", path.display());
            fs::remove_dir_all(path)?;
        }
        fs::rename(&staging_dir, path).with_context(|| {
            format!(
                "failed to move '{}' to '{}'",
                staging_dir.display(),
                path.display()
            )
        })?;

        info!(
            "converted {} examples into '{}'",
            header.num_examples,
            path.display()
        );

        Ok(RecordStore {
            dir: path.into(),
            header: Arc::new(header),
        })
    }
}

/// The handle of a record store on disk.
///
/// Handles are cheap to clone. Any number of handles can read concurrently
/// while a single writer attaches labels.
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: Arc<Path>,
    header: Arc<StoreHeader>,
}

impl RecordStore {
    /// Convert raw examples into a new store at `path`.
    pub fn convert<I>(
        path: impl AsRef<Path>,
        examples: I,
        image_shape: ImageShape,
        schema: FeatureSchema,
        split: Split,
        region: Option<Region>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = Result<RawExample>>,
    {
        RecordStoreInit {
            image_shape,
            schema,
            split,
            region,
            overwrite: false,
            examples,
        }
        .write(path)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let header_path = path.join(HEADER_FILE);
        if !header_path.is_file() {
            return Err(Error::NotFound(path.to_owned()).into());
        }

        let bytes = fs::read(&header_path)
            .with_context(|| format!("failed to read '{}'", header_path.display()))?;
        let header: StoreHeader = bincode::deserialize(&bytes).map_err(|err| {
            Error::schema(format!(
                "unable to decode header '{}': {}",
                header_path.display(),
                err
            ))
        })?;

        if header.magic != MAGIC {
            return Err(Error::schema(format!(
                "'{}' is not a record store header",
                header_path.display()
            )));
        }
        if header.version != FORMAT_VERSION {
            return Err(Error::schema(format!(
                "unsupported store format version {}, expect {}",
                header.version, FORMAT_VERSION
            )));
        }

        Ok(Self {
            dir: path.into(),
            header: Arc::new(header),
        })
    }

    /// Open a store and check its shape and schema against the caller's.
    pub fn open_expecting(
        path: impl AsRef<Path>,
        image_shape: &ImageShape,
        schema: &FeatureSchema,
    ) -> Result<Self> {
        let store = Self::open(path)?;
        store.check_schema(image_shape, schema)?;
        Ok(store)
    }

    pub fn check_schema(&self, image_shape: &ImageShape, schema: &FeatureSchema) -> Result<()> {
        let header = &self.header;
        if header.image_shape != *image_shape {
            return Err(Error::schema(format!(
                "the store has image shape {}, but {} is expected",
                header.image_shape, image_shape
            )));
        }
        if header.schema != *schema {
            return Err(Error::schema(format!(
                "the store has {} objects with {} attributes, but {} objects with {} attributes are expected",
                header.schema.num_objects,
                header.schema.num_attributes,
                schema.num_objects,
                schema.num_attributes
            )));
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn header(&self) -> &StoreHeader {
        &self.header
    }

    pub fn len(&self) -> usize {
        self.header.num_examples
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn split(&self) -> &Split {
        &self.header.split
    }

    pub fn region(&self) -> Option<&Region> {
        self.header.region.as_ref()
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.len(),
            }
            .into());
        }
        Ok(())
    }

    /// Load a single example.
    pub fn get(&self, index: usize) -> Result<Example> {
        self.check_index(index)?;
        let path = self.dir.join(EXAMPLES_DIR).join(file_name(index));
        let bytes =
            fs::read(&path).with_context(|| format!("failed to read '{}'", path.display()))?;
        let example: Example = bincode::deserialize(&bytes)
            .map_err(|err| Error::schema(format!("unable to decode example {}: {}", index, err)))?;
        if example.index != index {
            return Err(Error::schema(format!(
                "'{}' holds example {}",
                path.display(),
                example.index
            )));
        }
        Ok(example)
    }

    /// Lazily read examples in ascending index order.
    ///
    /// Duplicated indices are visited once. Calling it again with the same
    /// indices yields the same examples.
    pub fn read<I>(&self, indices: I) -> Result<ExampleReader>
    where
        I: IntoIterator<Item = usize>,
    {
        let indices: BTreeSet<usize> = indices.into_iter().collect();
        if let Some(&last) = indices.iter().next_back() {
            self.check_index(last)?;
        }
        Ok(ExampleReader {
            store: self.clone(),
            indices: indices.into_iter(),
        })
    }

    /// Attach a label to an example, replacing any prior label.
    ///
    /// Returns `false` if the same label was already attached.
    pub fn attach_label(&self, index: usize, label: &Label) -> Result<bool> {
        self.check_index(index)?;

        if self.label(index)?.as_ref() == Some(label) {
            trace!("label of example {} is unchanged", index);
            return Ok(false);
        }

        let path = self.label_path(index);
        utils::atomic_write(&path, &bincode::serialize(label)?)?;
        Ok(true)
    }

    /// Load the label attached to an example, if any.
    pub fn label(&self, index: usize) -> Result<Option<Label>> {
        self.check_index(index)?;
        let path = self.label_path(index);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read '{}'", path.display()))
            }
        };
        let label = bincode::deserialize(&bytes)
            .map_err(|err| Error::schema(format!("unable to decode label {}: {}", index, err)))?;
        Ok(Some(label))
    }

    /// List the indices that have a label attached.
    pub fn labeled_indices(&self) -> Result<BTreeSet<usize>> {
        let dir = self.dir.join(LABELS_DIR);
        let indices = fs::read_dir(&dir)?
            .map(|entry| -> Result<_> {
                let entry = entry?;
                let name = entry.file_name();
                let index = name
                    .to_str()
                    .and_then(|name| name.strip_suffix(".bin"))
                    .and_then(|stem| stem.parse::<usize>().ok());
                Ok(index)
            })
            .filter_map(|result| result.transpose())
            .try_collect()?;
        Ok(indices)
    }

    fn label_path(&self, index: usize) -> PathBuf {
        self.dir.join(LABELS_DIR).join(file_name(index))
    }
}

/// The lazy iterator returned by [RecordStore::read].
#[derive(Debug)]
pub struct ExampleReader {
    store: RecordStore,
    indices: std::collections::btree_set::IntoIter<usize>,
}

impl Iterator for ExampleReader {
    type Item = Result<Example>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.indices.next()?;
        Some(self.store.get(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.indices.size_hint()
    }
}

impl ExactSizeIterator for ExampleReader {}

fn file_name(index: usize) -> String {
    format!("{:08}.bin", index)
}

fn staging_path(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::config(format!("'{}' is not a valid store path", path.display())))?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_owned(),
        _ => PathBuf::from("."),
    };
    Ok(parent.join(format!(".{}.staging.{}", name, std::process::id())))
}
