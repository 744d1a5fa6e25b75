//! Directory server letting robots publish named integer attributes and read
//! each other's, keyed by network address.

mod acceptor;
pub mod attributes;
mod config;
mod directory;
pub mod logging;
mod session;
mod transport;
mod util;

pub use acceptor::Acceptor;
pub use attributes::AttributeMap;
pub use config::{Cli, Config};
pub use directory::AttributeDirectory;
pub use util::{ServerError, TransferError};
