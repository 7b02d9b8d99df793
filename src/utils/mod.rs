pub mod error_handling;
pub mod logging;
pub mod progress;
pub mod splitter_config;
