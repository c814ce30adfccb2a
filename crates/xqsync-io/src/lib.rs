//! Filesystem side of XQSync
//!
//! This crate covers everything that touches a local directory tree:
//!
//! - **Discovery**: [`FileFinder`] walks an input root with include and exclude patterns
//! - **Sidecars**: document metadata stored as JSON beside each content file
//! - **Reading**: [`FilePathReader`] loads content, streaming large files, plus sidecars
//! - **Writing**: [`FilePathWriter`] writes through a temporary file and a rename
//!
//! # Examples
//!
//! ```rust,no_run
//! use xqsync_io::FileFinder;
//!
//! let mut finder = FileFinder::new("/data/in").with_include(r"\.xml$").unwrap();
//! finder.find();
//! for uri in finder.list_relative_paths(std::path::Path::new("/data/in")) {
//!     println!("{}", uri);
//! }
//! ```

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod finder;
pub mod metadata;
pub mod path;
pub mod reader;
pub mod writer;

pub use finder::FileFinder;
pub use metadata::{is_sidecar, read_sidecar, sidecar_path, write_sidecar, METADATA_SUFFIX};
pub use path::{relative_uri, resolve_uri};
pub use reader::FilePathReader;
pub use writer::FilePathWriter;
