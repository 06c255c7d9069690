pub mod cli;
pub mod config;
pub mod deploy;

pub use config::DeployConfig;
