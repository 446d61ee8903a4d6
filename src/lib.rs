//! `resilient-request` builds and executes outbound HTTP requests with bounded
//! retries, per-attempt timeouts and structured diagnostics.
//!
//! - [`RequestBuilder`] validates configuration and produces a [`RequestSpec`]
//! - [`RequestExecutor::execute`] sends it, retrying timeouts and transport
//!   errors, and returns a fully buffered [`Response`]
//! - streamed request bodies are captured once into a [`ReplayableBody`]
//!   and replayed identically on every attempt

mod builder;
pub mod diagnostics;
mod error;
mod executor;
pub mod logging;
mod options;
mod payload;
mod request;
mod response;

pub use builder::RequestBuilder;
pub use diagnostics::{Diagnostics, FieldValue, Fields, Level, TracingDiagnostics};
pub use error::RequestError;
pub use executor::RequestExecutor;
pub use logging::{LogConfig, LogFormat, LogRotation};
pub use options::RequestOptions;
pub use payload::{Payload, ReplayableBody};
pub use request::{Method, RequestSpec};
pub use response::Response;

pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, RequestError>;
