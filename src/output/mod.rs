//! Output module for extracted records
//!
//! This module handles:
//! - Appending records to a job's NDJSON items file
//! - Reading accumulated records back
//! - Exporting records as a table or CSV

mod items;
mod table;

pub use items::{read_records, ItemWriter};
pub use table::Table;
