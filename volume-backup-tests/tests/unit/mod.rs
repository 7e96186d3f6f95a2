//! Unit tests for volume-backup building blocks

mod config;
mod docker;
mod encryption;
mod retention;
