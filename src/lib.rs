pub mod config;
pub mod dto;
pub mod error;
pub mod util;
