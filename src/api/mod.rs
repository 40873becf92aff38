//! REST client for Screeps-compatible servers.
//!
//! Servers in the wild disagree about endpoint paths, payload shapes and
//! field names, so everything here is built around ranked candidate lists
//! and best-effort extraction rather than a fixed schema.

pub mod auth;
pub mod batch;
pub mod cache;
pub mod console;
pub mod endpoints;
pub mod extract;
pub mod probe;
pub mod transport;

pub use auth::acquire_token;
pub use batch::send_many;
pub use cache::{CachedTransport, ResponseCache};
pub use console::{execute as run_console, ConsoleOutcome};
pub use endpoints::{EndpointCandidate, ResourceGroup};
pub use extract::{LeaderboardEntry, ResourceSummary, RoomSummary, LEADERBOARD_CAP, ROOM_CAP};
pub use probe::{resolve_endpoints, EndpointMap, ProbeOutcome, ProbeRecord};
pub use transport::{normalize_base_url, ApiRequest, ApiResponse, HttpTransport, Transport};
