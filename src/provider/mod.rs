//! LLM Provider layer
//!
//! A closed set of provider adapters (endpoint, auth headers, body shape),
//! the chat request type, and the HTTP transport the rotation client sends
//! through.

mod adapter;
mod request;
mod transport;

pub use adapter::*;
pub use request::*;
pub use transport::*;
