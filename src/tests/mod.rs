//! Cross-module tests: whole-kernel scenarios that exercise scheduling,
//! synchronization and timing together. Single-module tests live next to
//! the code they cover.

mod helpers;
mod integration;
