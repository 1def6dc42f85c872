//! Core library for now-playing-proxy
pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod poller;
pub mod proxy;
