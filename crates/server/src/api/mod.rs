pub mod handlers;
pub mod middleware;
pub mod problems;
pub mod routes;
pub mod rubrics;
pub mod tickets;
pub mod ws;

pub use routes::create_router;
pub use ws::{WsBroadcaster, WsMessage};
