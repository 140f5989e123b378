//! Command line front end for `delayed-job`: runs workers against Redis and
//! inspects or edits queue collections.

pub mod cli;
pub mod commands;
pub mod demo;
pub mod logging;
pub mod signals;

pub use cli::{Cli, Command};
pub use demo::register_demo_jobs;
