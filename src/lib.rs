pub mod archive;
pub mod config;
pub mod error;
pub mod export;
pub mod extrema;
pub mod job;
pub mod model;
pub mod period;
pub mod rank;
pub mod rollup;
pub mod store;
