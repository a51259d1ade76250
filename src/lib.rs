pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod hop;
pub mod host;
pub mod lifecycle;
pub mod profile;
pub mod ssh;
pub mod utils;

pub use config::Config;
pub use error::{Error, Result, Stage};
pub use executor::CommandExecutor;
pub use gateway::{GatewayConnector, GatewaySession, SshConnector, TunnelHandle};
pub use hop::{Endpoint, HopResolver};
pub use host::{HostDescriptor, HostOptions, HostRegistry, SshOptions, VagrantOption};
pub use lifecycle::{Suite, VerificationContext};
pub use profile::{ConnectionProfile, ProfileResolver, Provisioner, VagrantProvisioner};
