//! Junction-read breakpoint extraction and streaming clustering.

pub mod bam;
pub mod breakpoint;
pub mod config;
pub mod error;
pub mod input;
pub mod output;
pub mod pipeline;
pub mod utils;
