//! coincpix-io: File I/O for coincpix.
//!
//! This crate reads and writes NumPy `.npy` arrays through memory-mapped
//! files, loads reference images, persists the session configuration
//! (migrating version 3 recall files) and exports coincidences as CSV.
//!

mod dataset;
mod error;
pub mod npy;
mod recall;
mod reference;
mod writer;

pub use dataset::{read_events, read_image, write_events, write_image};
pub use error::{Error, Result};
pub use npy::{write_npy, Dtype, Endianness, NpyElement, NpyFile, NpyHeader};
pub use recall::{
    load_config, parse_legacy_recall, read_legacy_recall, save_config, DEFAULT_CONFIG_FILE,
    LEGACY_RECALL_FILE,
};
pub use reference::{load_reference, load_session_reference};
pub use writer::{EventCsvWriter, EVENT_CSV_HEADER};
