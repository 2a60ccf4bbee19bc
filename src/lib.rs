//! Unpack zip and gzip objects stored in S3 back into their bucket.
//!
//! The [`pipeline`] fetches a compressed object, decodes it with the [`archive`]
//! decoders and uploads every member through an [`s3::ObjectStore`]. The
//! [`handler`] module adapts direct invocations and S3 notifications into
//! pipeline requests.

pub mod archive;
pub mod cli;
pub mod config;
pub mod handler;
pub mod pipeline;
pub mod s3;
pub mod scratch;

pub use pipeline::{DecompressRequest, Pipeline, PipelineError, SUCCESS};
