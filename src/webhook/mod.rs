//! Inbound webhook: signature verification, payload normalization, routes.

pub mod normalize;
pub mod routes;
pub mod signature;

pub use normalize::normalize;
pub use routes::{SIGNATURE_HEADER, WebhookState, webhook_routes};
pub use signature::{sign, verify_signature};
