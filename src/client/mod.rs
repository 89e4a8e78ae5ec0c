//! Client wrapper over the RPC façade

mod memory_client;
mod transport;

pub use memory_client::{MemoryClient, OperationResult};
pub use transport::{ClientError, HttpTransport, LocalTransport, RpcTransport};
