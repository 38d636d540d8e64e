//! Pipeline flows.
//!
//! - `download` — fetch raw files over HTTP with a small worker pool
//! - `convert` — convert raw files to Zarr stores through the bounded dispatcher

pub mod convert;
pub mod download;

pub use convert::{ConvertTask, convert_raw_to_zarr, run_conversions};
pub use download::{DownloadTask, download_raw_data};
