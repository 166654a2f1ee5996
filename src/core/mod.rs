//! Core types for HTTP request/response handling.
//!
//! This module provides the fundamental types used throughout the middleware
//! pipeline and request handlers:
//!
//! - [`Request`] - HTTP request abstraction
//! - [`Response`] - HTTP response abstraction with builder pattern
//! - [`Context`] - Per-request state shared by pipeline stages
//! - [`Error`] - Startup and runtime errors
//!
//! # Example
//!
//! ```rust,ignore
//! use microtrace::core::{Context, Request, Response};
//!
//! fn handle(req: &Request, ctx: &Context) -> Response {
//!     tracing::info!(route = %ctx.route, "handling");
//!     Response::ok("Hello, World!")
//! }
//! ```

mod context;
mod error;
mod request;
mod response;

pub use context::Context;
pub use error::{Error, Result};
pub use request::Request;
pub use response::{Response, ResponseBuilder};
