pub mod presence;
pub mod replica;
