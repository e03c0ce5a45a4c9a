//! Tables generated by `dectab-tables` from the test grammars, compiled
//! against the runtime support they link to.

pub mod grammars;

/// Every bucket of `dectab/tests/data/grammar.txt`.
pub mod fixture {
    include!(concat!(env!("OUT_DIR"), "/fixture.rs"));
}

/// The two-level table of [`grammars::sparse_grammar`].
pub mod sparse {
    include!(concat!(env!("OUT_DIR"), "/sparse.rs"));
}
