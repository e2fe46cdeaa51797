//! Shared utilities.

pub mod hash;
pub mod process;

#[cfg(test)]
pub mod testutil;
