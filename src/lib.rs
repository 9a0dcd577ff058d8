//! Nextcloud WebDAV and OCS operations as declarative batch jobs.
//!
//! A job selects a resource (`file`, `folder`, `user`) and an operation,
//! supplies a batch of input records plus per-record parameters, and gets
//! back flat JSON output records. The [`request`] module turns each record
//! into an HTTP request, the [`transport`] executes it, and the
//! [`response`] module normalizes the server's XML, JSON or binary answer.
//! [`executor::Executor`] ties the three together, strictly sequentially
//! and with optional per-record error tolerance.

pub mod config;
pub mod errors;
pub mod executor;
pub mod models;
pub mod params;
pub mod request;
pub mod response;
pub mod transport;

pub use config::NextcloudConfig;
pub use errors::AdapterError;
pub use executor::Executor;
pub use models::{
    BinaryAttachment, FileOperation, FolderOperation, HttpEnvelope, Operation, OutputRecord,
    RawResponse, Record, RequestBody, Resource, ShareType, UserField, UserOperation,
};
pub use params::{ItemParameters, ParameterSource};
pub use transport::{HttpTransport, RetryConfig, Transport};
