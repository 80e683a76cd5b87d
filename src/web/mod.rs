//! WebSocket relay server for roomcast.
//!
//! Serves the realtime room protocol on `/ws` next to two small HTTP
//! routes (`/` and `/health`).

pub mod middleware;
pub mod router;
pub mod server;
pub mod ws;

pub use router::{create_health_router, create_router};
pub use server::WebServer;
pub use ws::{Ack, ClientMessage, ServerMessage};
