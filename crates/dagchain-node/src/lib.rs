//! Dagchain Node Library.
//!
//! The main feature of this library is to run the chain as a CLI application.

mod block_file;
mod cli;
mod commands;
mod error;

pub use self::block_file::{BlockFileReader, BlockFileWriter};
pub use self::cli::run;
pub use self::error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
