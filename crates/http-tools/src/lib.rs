//! Outbound HTTP primitives shared by the apibridge engine and host.
//!
//! - [`safety`]: which destinations may be called and how large a response may be
//! - [`body`]: reading and classifying response bodies
//! - [`semantics`]: MCP tool annotations derived from HTTP method semantics
//!
//! Nothing in here knows about `OpenAPI`.

pub mod body;
pub mod error;
pub mod safety;
pub mod semantics;
