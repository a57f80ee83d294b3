pub mod config;
pub mod error;
pub mod monitor;
pub mod notifications;
pub mod ping;
pub mod store;
pub mod version;

pub use monitor::herald::Herald;
