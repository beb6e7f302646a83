//! Run-scoped metric and image logging.
//!
//! A run directory (`<root>/<run_name>/`) holds an append-only JSONL scalar
//! stream plus PNG image grids, both keyed by tag and integer step. An
//! external viewer consumes the directory; this crate only appends, flushes,
//! and reads it back for summaries and tests.

pub mod grid;
pub mod reader;
pub mod writer;

pub use grid::{colorize, make_grid, overlay, resize_nearest, PlanarImage};
pub use reader::RunReader;
pub use writer::{RunWriter, ScalarEvent};
