mod api;
mod config;
mod routes;
mod sessions;
pub mod utils;

pub use utils::test_utils;
