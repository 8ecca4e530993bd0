// quire-common: shared types and utilities for the Quire workspace

pub mod crdt;
pub mod diff;
pub mod protocol;
pub mod types;
