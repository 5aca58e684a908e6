//! Breakpoint file output
//!
//! This module provides:
//! - `Display` impls that render junction evidence and clusters as rows
//! - `parse_row` for reading either row kind back
//! - `RowWriter` / `open_rows` for plain or BGZF-compressed, tabix-indexed files

pub mod row;
pub mod writer;

pub use row::parse_row;
pub use writer::{Locus, RowWriter, index_path, open_rows};
