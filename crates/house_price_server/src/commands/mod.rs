//! CLI command implementations.

pub mod inspect;
pub mod predict;
pub mod serve;

#[cfg(test)]
mod fixtures;
