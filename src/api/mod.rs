pub mod auth;
pub mod client;

pub use auth::{Credentials, HttpAuthProvider, TokenCache};
pub use client::{HttpTelemetrySource, TelemetrySource, TimeWindow};
