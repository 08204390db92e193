pub mod health;
pub mod limiters;
pub mod routes;

pub use routes::{create_router, AppState};
