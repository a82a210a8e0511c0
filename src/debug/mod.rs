//! Development helpers.
//!
//! Rivulet logs through [`tracing`]; nothing is printed until a subscriber is installed.
//! [`logging::install`] sets up a console subscriber filtered by `RUST_LOG`.

pub mod logging;

pub use logging::{install, set_log_level};
