pub mod routes;
pub mod submit;

pub use routes::{create_router, AppState};
