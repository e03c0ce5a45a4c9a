/// Fixed-seed parameter source; identical seeds give identical searches.
#[derive(Debug, Clone)]
pub(crate) struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    pub(crate) fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}

/// Candidate table sizes from `n` to `max_factor * n` in `steps` equal
/// increments; deduplicated, never below two.
pub(crate) fn table_sizes(n: usize, steps: usize, max_factor: f64) -> Vec<usize> {
    let steps = steps.max(1);
    let mut sizes = (0..=steps)
        .map(|i| {
            let extra = n as f64 * (max_factor - 1.0) * i as f64 / steps as f64;
            (n + extra.ceil() as usize).max(2)
        })
        .collect::<Vec<_>>();
    sizes.dedup();
    sizes
}
