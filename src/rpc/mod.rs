//! JSON-RPC façade and the HTTP surface around it

mod dispatch;
mod handlers;
mod server;
mod types;

pub use dispatch::handle_request;
pub use handlers::AppState;
pub use server::serve;
pub use types::{MemoryMethod, RelationInput, RpcRequest, RpcResponse};
