//! Integration tests across holders.

pub mod fixtures;

mod flows;
mod properties;
