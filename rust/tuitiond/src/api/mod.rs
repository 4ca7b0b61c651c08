mod client;
mod error;
mod retry;

pub use client::{encode_query, ApiClient, TokenStore, REQUEST_ID_HEADER};
pub use error::ApiError;
pub use retry::{RequestKind, RetryPolicy};
