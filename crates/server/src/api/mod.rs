pub mod handlers;
pub mod jobs;
pub mod middleware;
pub mod routes;
pub mod violations;

pub use routes::create_router;
