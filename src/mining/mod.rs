//! Mining module - the continuous block production loop

mod miner;

pub use miner::*;
