pub mod api;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod flags;
pub mod gates;
pub mod log;
pub mod notify;
pub mod rest;
pub mod transition;
pub mod types;
