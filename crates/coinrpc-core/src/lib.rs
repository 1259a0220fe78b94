pub mod config;
pub mod error;
pub mod rpc;

#[cfg(test)]
mod test_util;

pub use config::ConnConfig;
pub use error::{CoreError, RpcError};
pub use rpc::{CallContext, Client};
