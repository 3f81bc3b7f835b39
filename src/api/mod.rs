// HTTP and WebSocket APIs (§6 External Interfaces)

pub mod admin;
pub mod afl;
pub mod health;
pub mod matches;
pub mod readmodels;
pub mod ws;

pub use admin::{create_admin_router, AdminAppState};
pub use afl::{create_afl_router, AflAppState};
pub use health::{create_health_router, HealthAppState};
pub use matches::{create_matches_router, MatchesAppState};
pub use readmodels::{create_readmodels_router, ReadModelsAppState};
pub use ws::{create_ws_router, WsAppState};
