pub mod atomic;
pub mod deterministic;
pub mod hash;
