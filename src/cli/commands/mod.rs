pub mod config;
pub mod overview;
pub mod tokens;
