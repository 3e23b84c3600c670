pub mod error;
pub mod handlers;
pub mod logging_middleware;
pub mod middleware;
pub mod routes;
pub mod server;

pub use routes::create_router;
