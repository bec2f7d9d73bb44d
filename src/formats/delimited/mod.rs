//! Delimited text files (CSV, TSV, ...)

pub mod reader;
pub mod writer;
