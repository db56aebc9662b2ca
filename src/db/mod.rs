mod connection;
mod helpers;
mod migrations;
pub mod models;
pub mod repositories;

pub use connection::Database;
pub use models::KvEntry;
pub use repositories::sessions::{SessionStore, SESSIONS_KEY};
