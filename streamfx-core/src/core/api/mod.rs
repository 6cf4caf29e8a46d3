pub use models::*;
pub use server::*;

mod models;
mod server;
