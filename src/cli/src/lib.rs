//! Strata CLI - inspect and drive the layered snapshot store.

pub mod commands;
pub mod output;
