pub mod app;
pub mod batch;
pub mod config;
pub mod domain;
pub mod error;
pub mod eutils;
pub mod extract;
pub mod output;
pub mod session;
pub mod table;
pub mod tui;
