use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot synthesise a hash function over an empty key set")]
    EmptyKeySet,
    #[error("key {key:#x} does not fit in {width} bits")]
    KeyWidth { key: u64, width: u8 },
    #[error("no perfect hash function found for {keys} keys")]
    Exhausted { keys: usize },
    #[error("first-level bucket {bucket} ({keys} keys) has no perfect second-level function")]
    SecondLevel { bucket: usize, keys: usize },
}
