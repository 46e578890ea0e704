pub mod config;
pub mod dag;
pub mod errors;
pub mod health;
pub mod init;
pub mod migrate;
pub mod next_action;
pub mod parsers;
pub mod paths;
pub mod state;
pub mod tracker;
pub mod util;
