pub mod app;
pub mod client;
pub mod conf;
pub mod copy;
pub mod error;
pub mod host;
pub mod path;
pub mod sign;
pub mod trigger;
