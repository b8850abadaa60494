//! Shared helpers.

pub mod structured_data_file;

pub use structured_data_file::StructuredDataFile;
