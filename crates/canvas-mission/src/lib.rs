pub mod config;
pub mod context;
pub mod missions;
pub mod patterns;
pub mod runner;

pub use config::MissionConfig;
pub use context::MissionContext;
pub use missions::{find, registry, Mission, RegistryError};
pub use runner::MissionRunner;
