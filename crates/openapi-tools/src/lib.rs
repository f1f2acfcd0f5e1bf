//! `OpenAPI` → MCP tool engine.
//!
//! A document is loaded once ([`loader`]), turned into an immutable [`catalog::LoadedCatalog`]
//! (one tool per operation), and each tool call is validated ([`validator`]) and sent
//! upstream ([`dispatch`]). [`source::OpenApiToolSource`] ties these together.
//!
//! Transport bindings live elsewhere; nothing here reads stdin/stdout or the environment.

pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod loader;
pub mod params;
pub mod resolver;
pub mod schema;
pub mod source;
pub mod validation;
pub mod validator;

pub use catalog::{LoadedCatalog, ToolDescriptor};
pub use config::ApiSourceConfig;
pub use dispatch::{CallParameters, CallReport, InvocationContext};
pub use error::{OpenApiToolsError, Result};
pub use source::OpenApiToolSource;
