//! Terminal presentation layer

pub mod markets;
pub mod setup;
pub mod show;
pub mod ui;
