pub mod dune;
pub mod env;
pub mod log;
mod performance;

pub use dune::{fetch_dune_data, CutoffBlocks, DuneData, FetchOptions};
