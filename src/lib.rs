pub mod catalog;
pub mod config;
pub mod constants;
pub mod error;
pub mod journal;
pub mod logging;
pub mod metrics;
pub mod parser;
pub mod session;
pub mod tasks;
pub mod units;
pub mod vocab;
