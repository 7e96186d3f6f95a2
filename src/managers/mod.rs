pub mod archive;
pub mod backup;
pub mod containers;
pub mod distribution;
pub mod encryption;
pub mod logging;
pub mod notification;
pub mod retention;
pub mod stats;
