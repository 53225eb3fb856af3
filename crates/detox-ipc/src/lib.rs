//! IPC layer for detoxd
//!
//! One JSON document per line over a Unix domain socket. Clients send
//! [`detox_api::Request`]s and read [`detox_api::Response`]s; subscribed
//! clients also receive [`detox_api::Event`]s on the same connection.

mod client;
mod server;

pub use client::*;
pub use server::*;

use detox_api::ErrorInfo;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Unexpected message: {0}")]
    InvalidMessage(String),

    #[error("Server not started")]
    NotStarted,

    /// The daemon answered with an error
    #[error("Request rejected ({:?}): {}", .0.code, .0.message)]
    Rejected(ErrorInfo),
}

pub type IpcResult<T> = Result<T, IpcError>;
