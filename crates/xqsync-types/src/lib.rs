//! Core type system and error handling for XQSync
//!
//! This crate provides the foundational types shared by every XQSync crate:
//!
//! - **Error handling**: a two-tier error taxonomy separating fatal conditions from
//!   per-document failures
//! - **Document model**: content, metadata, permissions and read status
//! - **Traits**: async reader, writer and identifier source seams
//! - **Configuration**: validated thread count, batch size and retry values
//!
//! # Examples
//!
//! ```rust
//! use xqsync_types::{Capability, Document, DocumentMetadata, Permission};
//!
//! let mut metadata = DocumentMetadata::new();
//! metadata.add_collection("reports");
//! metadata.add_permission(Permission::new("reader", Capability::Read));
//!
//! let mut document = Document::new("/reports/q1.xml");
//! document.load("<report/>".into(), metadata);
//! assert!(document.is_loaded());
//! ```

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod document;
pub mod error;
pub mod result;
pub mod traits;

// Re-export commonly used types
pub use config::{BatchSize, RetryConfig, ThreadCount};
pub use document::{
    Capability, Document, DocumentContent, DocumentFormat, DocumentMetadata, Permission,
    ReadStatus, DEFAULT_STREAMING_THRESHOLD,
};
pub use error::{Error, ErrorKind, ErrorSeverity};
pub use result::Result;
pub use traits::{DocumentReader, DocumentWriter, IdentifierSource};
