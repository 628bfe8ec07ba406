//! Step definitions for Cucumber BDD tests
//!
//! This module contains all Given/When/Then step implementations. Rules are
//! written between backticks so they can carry quotes of either kind.

pub mod given;
pub mod then;
pub mod when;
