//! CLI command implementations

pub mod convert;
pub mod error;
pub mod inspect;
pub mod output;
pub mod signals;

/// Fatal error: configuration, I/O or write failure. No output was produced.
pub const EXIT_FATAL: u8 = 1;
/// The artifact was written but some lines were rejected.
pub const EXIT_REJECTIONS: u8 = 2;
/// Interrupted by SIGINT/SIGTERM. No output was produced.
pub const EXIT_CANCELLED: u8 = 130;
