mod expiration;
mod manager;
pub mod policy;
mod readwriter;
mod renewer;

pub use expiration::short_human_duration;
pub use manager::Manager;
