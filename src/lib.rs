// Library root: re-exports all modules so integration tests and external
// consumers can access the crate's public API.

pub mod app;
pub mod config;
pub mod console;
pub mod db;
pub mod draft;
pub mod engine;
pub mod feeds;
pub mod names;
pub mod rankings;
pub mod valuation;
