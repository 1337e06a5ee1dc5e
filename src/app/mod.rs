//! Application module

pub mod cli;
pub mod commands;
pub mod consumer;
pub mod error;
pub mod startup;
