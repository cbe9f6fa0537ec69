pub mod types;

pub use types::ClusterConfig;
