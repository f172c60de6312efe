//! Writer for DwarfIdea databases: compact, block-structured, queryable
//! files mapping geolocated radio identifiers (Wi-Fi BSSIDs, cell IDs)
//! to coordinates, optimized for offline read-mostly use.

pub mod aggregate;
pub mod block;
pub mod builder;
pub mod codec;
pub mod entry;
pub mod error;
pub mod geo;
pub mod keys;
pub mod partition;

pub use crate::aggregate::LocationAggregator;
pub use crate::builder::{BssidBuilder, CellsBuilder, DbBuilder};
pub use crate::error::{BuildError, Error};
