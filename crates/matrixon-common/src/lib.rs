//! Matrixon Common Library
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.11.0-alpha
//!
//! Shared error taxonomy and identifier types for the relations service.

pub mod error;
pub mod types;

pub use error::{ErrorKind, MatrixonError, Result};
pub use types::{Direction, EventType, RelationType};
