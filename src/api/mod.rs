pub mod client;
pub mod error;
pub mod events;
pub mod models;
pub mod routes;
pub mod services;
pub mod transport;

pub use client::{ApiClient, ApiRequest};
pub use error::{ApiError, TransportError};
