#![forbid(unsafe_code)]
//! runmesh-store: the key/value layer every node shares, plus typed row
//! tables with ordered queries and tabular export writers.
//!
//! - `storage`: the `Storage` trait, memory and filesystem backends, and
//!   `build_storage_from_config` picking one by URI scheme.
//! - `table`: schema-shaped rows under a key prefix with `find_ordered`.
//! - `writers`: CSV and JSON-lines sinks for `Table`s.

pub mod error;
pub mod path;
pub mod storage;
pub mod table;
pub mod writers;

pub use error::{Result, StoreError};
pub use storage::{build_storage_from_config, FsStorage, MemoryStorage, Storage};
pub use table::{Cursor, Row, RowTable};
