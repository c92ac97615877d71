pub mod classify;
pub mod config;
pub mod diagram;
pub mod error;
pub mod fetch;
pub mod loader;
pub mod output;
pub mod record;
pub mod region;
pub mod session;
pub mod survey;
