//! Dashboard client for Screeps-compatible game servers.
//!
//! The client signs in, probes which of several known endpoint shapes the
//! server actually answers, caches that endpoint map in the session, and
//! then serves dashboard snapshots through it.

pub mod api;
pub mod cli;
pub mod dashboard;
pub mod error;
pub mod rooms;
pub mod session;

pub use error::{DashError, Result};
