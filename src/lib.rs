//! sonar-zarr — download raw sonar files and convert them to Zarr stores
//! through a bounded-concurrency dispatcher.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod flow;
pub mod job;
pub mod runner;
pub mod store;
pub mod zarr;
