use crate::{common::*, error::Error};

/// The partition that an index belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Partition {
    Train,
    Validation,
    Test,
}

/// Train, validation and test counts over contiguous index ranges.
///
/// The ranges are laid out in that order from index 0. A count of 0 skips
/// the partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Split {
    pub train: usize,
    pub validation: usize,
    pub test: usize,
}

impl Split {
    pub fn new(train: usize, validation: usize, test: usize) -> Self {
        Self {
            train,
            validation,
            test,
        }
    }

    pub fn total(&self) -> usize {
        self.train + self.validation + self.test
    }

    pub fn train_range(&self) -> Range<usize> {
        0..self.train
    }

    pub fn validation_range(&self) -> Range<usize> {
        let begin = self.train;
        begin..(begin + self.validation)
    }

    pub fn test_range(&self) -> Range<usize> {
        let begin = self.train + self.validation;
        begin..(begin + self.test)
    }

    pub fn range(&self, partition: Partition) -> Range<usize> {
        match partition {
            Partition::Train => self.train_range(),
            Partition::Validation => self.validation_range(),
            Partition::Test => self.test_range(),
        }
    }

    pub fn partition_of(&self, index: usize) -> Option<Partition> {
        [Partition::Train, Partition::Validation, Partition::Test]
            .into_iter()
            .find(|&partition| self.range(partition).contains(&index))
    }

    /// Check that the split fits in a dataset of `num_examples`.
    pub fn validate(&self, num_examples: usize) -> Result<()> {
        if self.total() > num_examples {
            return Err(Error::config(format!(
                "split ({}, {}, {}) requires {} examples, but the dataset has {}",
                self.train,
                self.validation,
                self.test,
                self.total(),
                num_examples
            )));
        }
        Ok(())
    }
}
