//! # lectern-core
//!
//! Core types, traits, and abstractions for the lectern library element
//! store.
//!
//! This crate provides the data structures, the error taxonomy, and the pure
//! pieces of element handling (model synchronization, folder filter parsing,
//! uid generation) that the storage crate builds on.

pub mod defaults;
pub mod error;
pub mod folder_filter;
pub mod logging;
pub mod model_sync;
pub mod models;
pub mod traits;
pub mod uid;

// Re-export commonly used types at crate root
pub use error::{Error, ErrorKind, Result};
pub use folder_filter::FolderFilter;
pub use model_sync::sync_fields_with_model;
pub use models::*;
pub use traits::*;
pub use uid::{generate_short_uid, validate_uid, ShortUidGenerator, UidGenerator};
