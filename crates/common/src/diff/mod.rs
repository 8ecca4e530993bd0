mod myers;

pub mod lines;
pub mod patch;

pub use myers::MAX_EDIT_DISTANCE;
