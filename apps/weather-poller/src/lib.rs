pub mod cli;
pub mod clock;
pub mod config;
pub mod console;
pub mod error;
pub mod export;
pub mod fetch;
pub mod listener;
pub mod normalize;
pub mod reading;
pub mod scheduler;
pub mod shutdown;
pub mod store;
