pub mod api;
pub mod server;

pub use api::{AppState, ApiError};
pub use server::{router, run_server};
