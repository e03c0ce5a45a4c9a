use crate::hash::{Hash, FKS_PRIME};
use crate::keys::KeySet;
use crate::search::SplitMix64;

pub(crate) fn search(
    keys: &KeySet,
    sizes: &[usize],
    attempts: usize,
    rng: &mut SplitMix64,
) -> Option<Hash> {
    for &size in sizes {
        for attempt in 0..attempts {
            let hash = Hash::Fks {
                a: rng.next_u64() % (FKS_PRIME - 1) + 1,
                b: rng.next_u64() % FKS_PRIME,
                size,
            };
            if keys.is_perfect_under(&hash) {
                log::trace!(
                    "fks hash of size {size} for {} keys after {} attempts",
                    keys.len(),
                    attempt + 1
                );
                return Some(hash);
            }
        }
        log::trace!("no fks hash of size {size} for {} keys", keys.len());
    }
    None
}
