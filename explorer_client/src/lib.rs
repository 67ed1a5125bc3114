pub mod client;
pub mod error;
pub mod tracked_tokens;
pub mod types;

pub use client::{parse_block_number, parse_rows, ExplorerClient};
pub use error::ExplorerError;
pub use tracked_tokens::{parse_tracked_tokens, TrackedTokenClient};
pub use types::*;
