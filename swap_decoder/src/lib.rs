//! Registry-driven decoding of aggregator router call data.
//!
//! A transaction's input is matched by selector against the *entry* table
//! (methods on the router itself). The entry route yields the input amount and
//! an embedded call blob, which is matched against the *wrapped* table to find
//! the source and destination tokens. Unknown selectors are reported, never
//! guessed.

pub mod decoder;
pub mod registry;

pub use decoder::{decode_swap, DecodedSwap, SwapDecoder};
pub use registry::{
    builtin_entry_routes, builtin_wrapped_routes, Field, PathStep, RouteRegistry, Shape,
    SwapRouteDescriptor, ROUTER_ADDRESS,
};

use retry_utils::{DescribeError, ErrorShape};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Unsupported route {selector} in tx {tx_hash}")]
    UnsupportedRoute { selector: String, tx_hash: String },
    #[error("Call data too short ({len} bytes) in tx {tx_hash}")]
    Truncated { tx_hash: String, len: usize },
    #[error("Call data is not hex in tx {tx_hash}: {message}")]
    InvalidHex { tx_hash: String, message: String },
    #[error("ABI decoding of {route} failed in tx {tx_hash}: {message}")]
    Abi {
        route: String,
        tx_hash: String,
        message: String,
    },
    #[error("Path {path} of {route} does not resolve: {message}")]
    Path {
        route: String,
        path: String,
        message: String,
    },
    #[error("Route {route} has no {field} path")]
    MissingPath { route: String, field: &'static str },
    #[error("Duplicate selector {0} in route registry")]
    DuplicateSelector(String),
}

impl DescribeError for DecodeError {
    fn detail(&self, shape: ErrorShape) -> Option<String> {
        match (self, shape) {
            (DecodeError::Abi { message, .. }, ErrorShape::Cause) => Some(message.clone()),
            (_, ErrorShape::Message) => Some(self.to_string()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// `0x`-prefixed lowercase rendering of a selector.
pub fn format_selector(selector: &[u8; 4]) -> String {
    format!("0x{}", hex::encode(selector))
}
