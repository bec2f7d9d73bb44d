//! Flat file formats: record types, delimited reading and writing

pub mod delimited;
pub mod reader;

pub use delimited::reader::{BatchReader, DelimitedReader};
pub use delimited::writer::CsvBatchWriter;
pub use reader::{Batch, DelimitedConfig, Record, raw_text};
