//! # exposure-server
//!
//! Host daemon library for the exposure correlation engine: API handlers,
//! shared state, and logging setup.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;
