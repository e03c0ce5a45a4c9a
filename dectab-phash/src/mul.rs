use crate::hash::Hash;
use crate::keys::KeySet;
use crate::search::SplitMix64;

/// First odd multiplier, over the candidate sizes in order, that is perfect
/// on `keys`.
pub(crate) fn search(
    keys: &KeySet,
    sizes: &[usize],
    attempts: usize,
    rng: &mut SplitMix64,
) -> Option<Hash> {
    for &size in sizes {
        for attempt in 0..attempts {
            let hash = Hash::Multiplicative {
                multiplier: rng.next_u64() | 1,
                size,
            };
            if keys.is_perfect_under(&hash) {
                log::trace!(
                    "multiplicative hash of size {size} for {} keys after {} attempts",
                    keys.len(),
                    attempt + 1
                );
                return Some(hash);
            }
        }
        log::trace!("no multiplicative hash of size {size} for {} keys", keys.len());
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::search::table_sizes;

    #[test]
    fn finds_perfect_multiplier() {
        let keys = KeySet::new((0..40).map(|k| k * 977 + 13), 32).unwrap();
        let mut rng = SplitMix64::new(1);
        let hash = search(&keys, &table_sizes(40, 10, 2.0), 512, &mut rng).unwrap();

        assert!(matches!(hash, Hash::Multiplicative { multiplier, .. } if multiplier & 1 == 1));
        assert!(keys.is_perfect_under(&hash));
    }
}
