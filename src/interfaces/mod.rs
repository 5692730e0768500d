//! Script input and transcript output for the command-line session runner.

pub mod command;
pub mod csv;
pub mod json;
pub mod session;
