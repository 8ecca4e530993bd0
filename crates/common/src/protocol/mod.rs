pub mod agent;
pub mod compile;
