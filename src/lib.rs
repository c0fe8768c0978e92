//! Live audio capture with a rolling history window and periodogram
//! estimation.
//!
//! - [`audio`]: device boundary, capture engine, history window, estimator
//! - [`pipeline`]: controller, spectral worker, presentation sinks
//! - [`config`]: TOML settings
//! - [`console`]: command parsing for the console front end

pub mod audio;
pub mod config;
pub mod console;
pub mod pipeline;
