//! Browser-compatible stored-entry ZIP assembly for multi-file downloads.

pub mod assemble;

pub use assemble::{build_stored_zip, ZipEntryInput};
