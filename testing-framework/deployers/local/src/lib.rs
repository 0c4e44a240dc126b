mod chain;
mod config;
mod keyring;
mod ledger;
mod runner;

pub use chain::{LocalChain, Sealer};
pub use config::{DEV_ACCOUNTS, LocalChainConfig, Sealing};
pub use keyring::{DevKeyring, DevSigner};
pub use runner::{LocalDeployer, LocalDeployerError, LocalRun};
