pub mod cancel;
pub mod check;
pub mod collaborator;
pub mod config;
pub mod error;
pub mod executor;
pub mod graph;
pub mod io;
pub mod manifest;
pub mod paths;
pub mod plan;
pub mod ratelimit;
pub mod scheduler;
pub mod types;
pub mod unit;
pub mod workspace;

pub use error::{ConductorError, Result};
