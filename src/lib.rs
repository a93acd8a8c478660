//! findex library
//!
//! Full-text search index over a directory tree, kept synchronized with
//! filesystem changes. Queries always read the latest fully-committed
//! index generation, never a partial rebuild.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod index;
pub mod observability;
pub mod sync;
pub mod watcher;

pub use config::Config;
pub use error::{Error, IndexError, Result, ScanError, WatchError};
