pub mod api;
pub mod assets;
pub mod config;
pub mod db;
pub mod error;
pub mod fanout;
pub mod fetcher;
pub mod poller;
pub mod state;
pub mod ticker;
pub mod types;
