#![allow(dead_code)]

pub mod db;
pub mod support;

pub use self::{
    db::{Connection, Database, Pool, setup_db},
    support::run,
};
