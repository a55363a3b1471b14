//! Observability infrastructure for the prayerlink client

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};
