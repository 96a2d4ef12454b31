pub mod annotate;
pub mod client;
pub mod codec;
pub mod config;
pub mod dates;
pub mod entry;
pub mod error;
pub mod filter;
pub mod grid;
pub mod protocol;
pub mod render;
pub mod report;
pub mod selection;
pub mod server;
pub mod store;
