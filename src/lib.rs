#[macro_use] extern crate diesel;

#[cfg(not(debug_assertions))]
#[macro_use]
extern crate diesel_migrations;

#[macro_use] mod macros;

pub mod audit;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod permissions;
pub mod queue;
pub mod storage;
pub mod utils;

pub use self::error::{ApiError, Error, ErrorKind};

pub type Result<T, E = failure::Error> = std::result::Result<T, E>;
