// quire-server: HTTP front end for document compilation.

#[cfg(feature = "http")]
pub mod api;
#[cfg(feature = "http")]
pub mod app;
pub mod compile;
pub mod config;
#[cfg(feature = "http")]
pub mod cors;
#[cfg(feature = "http")]
pub mod error;
