pub mod collector;
pub mod config;
pub mod exposition;
pub mod ping;
pub mod server;
pub mod util;
