//! Middleware for the relay's HTTP surface.

pub mod cors;

pub use cors::create_cors_layer;
