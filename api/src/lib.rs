// Control API: runtime language switch and manual digest triggers

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::{create_router, serve};
pub use state::AppState;
