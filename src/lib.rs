//! Matrixon Relations
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.11.0-alpha
//!
//! Event relations for Matrixon: clients attach annotations, references and
//! other relation types to existing events, and read them back either as a
//! paginated list of child events or as annotation groups counted per
//! (event type, key).
//!
//! The storage layer lives in `matrixon-db`, error and identifier types in
//! `matrixon-common`. This crate wires them into services and an axum router.

pub mod api;
pub mod config;
pub mod database;
pub mod service;
pub mod utils;

pub use config::Config;
pub use matrixon_common::{MatrixonError, Result};
pub use service::Services;
