use crate::error::Error;
use crate::hash::Hash;

/// A sorted, duplicate-free set of keys, each at most `width` bits wide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySet {
    keys: Vec<u64>,
    width: u8,
}

impl KeySet {
    pub fn new<I>(keys: I, width: u8) -> Result<Self, Error>
    where
        I: IntoIterator<Item = u64>,
    {
        let mut keys = keys.into_iter().collect::<Vec<_>>();
        keys.sort_unstable();
        keys.dedup();

        if keys.is_empty() {
            return Err(Error::EmptyKeySet);
        }

        if width < 64 {
            if let Some(&key) = keys.last().filter(|&&key| key >> width != 0) {
                return Err(Error::KeyWidth { key, width });
            }
        }

        Ok(Self { keys, width })
    }

    pub fn keys(&self) -> &[u64] {
        &self.keys
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.keys.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn min(&self) -> u64 {
        self.keys[0]
    }

    pub fn max(&self) -> u64 {
        self.keys[self.keys.len() - 1]
    }

    pub fn is_contiguous(&self) -> bool {
        self.max() - self.min() == (self.len() - 1) as u64
    }

    /// Does `hash` send every key to its own in-range slot?
    pub fn is_perfect_under(&self, hash: &Hash) -> bool {
        let mut taken = vec![false; hash.size()];
        self.keys.iter().all(|&key| match hash.index(key) {
            Some(slot) if slot < taken.len() && !taken[slot] => {
                taken[slot] = true;
                true
            }
            _ => false,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn keys_are_sorted_and_unique() -> Result<(), Error> {
        let keys = KeySet::new([9, 3, 3, 5], 4)?;
        assert_eq!(keys.keys(), &[3, 5, 9]);
        assert_eq!((keys.min(), keys.max()), (3, 9));
        assert!(!keys.is_contiguous());
        assert!(KeySet::new([4, 5, 6], 3)?.is_contiguous());
        Ok(())
    }

    #[test]
    fn full_width_span() -> Result<(), Error> {
        let keys = KeySet::new([0, u64::MAX], 64)?;
        assert!(!keys.is_contiguous());
        assert!(KeySet::new([u64::MAX - 1, u64::MAX], 64)?.is_contiguous());
        assert!(KeySet::new([u64::MAX], 64)?.is_contiguous());
        Ok(())
    }

    #[test]
    fn empty_and_oversized_sets_are_rejected() {
        assert!(matches!(KeySet::new(Vec::new(), 8), Err(Error::EmptyKeySet)));
        assert!(matches!(
            KeySet::new([0x100], 8),
            Err(Error::KeyWidth { key: 0x100, width: 8 })
        ));
    }

    #[test]
    fn perfection_check() -> Result<(), Error> {
        let keys = KeySet::new([10, 11, 12], 4)?;
        assert!(keys.is_perfect_under(&Hash::Linear { min: 10, size: 3 }));
        assert!(!keys.is_perfect_under(&Hash::Linear { min: 10, size: 2 }));
        assert!(!keys.is_perfect_under(&Hash::Trivial));
        Ok(())
    }
}
