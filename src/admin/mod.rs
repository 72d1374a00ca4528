//! Operator-facing HTTP API.

pub mod routes;

pub use routes::{AdminState, admin_routes};
