// quire-editor: the client-side collaborative editing core.

pub mod backend;
pub mod config;
pub mod engine;
pub mod history;
pub mod proposal;
pub mod session;
