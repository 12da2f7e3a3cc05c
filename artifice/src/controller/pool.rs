use crate::{common::*, error::Error};

/// The labeled and unlabeled index sets of a run.
///
/// The two sets are disjoint and their union never changes. Indices only
/// move from `unlabeled` to `labeled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    labeled: BTreeSet<usize>,
    unlabeled: BTreeSet<usize>,
}

impl PoolState {
    /// Create a pool with every candidate unlabeled.
    pub fn unlabeled(candidates: impl IntoIterator<Item = usize>) -> Self {
        Self {
            labeled: BTreeSet::new(),
            unlabeled: candidates.into_iter().collect(),
        }
    }

    /// Create a pool with every candidate labeled.
    pub fn labeled(candidates: impl IntoIterator<Item = usize>) -> Self {
        Self {
            labeled: candidates.into_iter().collect(),
            unlabeled: BTreeSet::new(),
        }
    }

    pub fn labeled_set(&self) -> &BTreeSet<usize> {
        &self.labeled
    }

    pub fn unlabeled_set(&self) -> &BTreeSet<usize> {
        &self.unlabeled
    }

    pub fn labeled_indices(&self) -> Vec<usize> {
        self.labeled.iter().copied().collect()
    }

    pub fn unlabeled_indices(&self) -> Vec<usize> {
        self.unlabeled.iter().copied().collect()
    }

    /// The number of candidates, labeled or not.
    pub fn len(&self) -> usize {
        self.labeled.len() + self.unlabeled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_exhausted(&self) -> bool {
        self.unlabeled.is_empty()
    }

    /// Check that the sets are disjoint and lie in the train range.
    pub fn check(&self, train_range: &Range<usize>) -> Result<()> {
        if let Some(index) = self.labeled.intersection(&self.unlabeled).next() {
            return Err(Error::config(format!(
                "index {} is both labeled and unlabeled",
                index
            )));
        }
        if let Some(index) = self
            .labeled
            .iter()
            .chain(&self.unlabeled)
            .find(|&&index| !train_range.contains(&index))
        {
            return Err(Error::config(format!(
                "index {} is outside of the train range {:?}",
                index, train_range
            )));
        }
        Ok(())
    }

    /// Move the selected indices to the labeled set.
    ///
    /// Either every index moves or nothing changes.
    pub fn commit(&mut self, selected: &[usize]) -> Result<()> {
        let selected: BTreeSet<usize> = selected.iter().copied().collect();
        if let Some(index) = selected.difference(&self.unlabeled).next() {
            bail!("index {} is not in the unlabeled pool", index);
        }

        self.unlabeled = self.unlabeled.difference(&selected).copied().collect();
        self.labeled.extend(selected);
        Ok(())
    }
}
