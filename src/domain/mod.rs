//! Domain layer - Readiness label derivation and port definitions
//!
//! This module defines the readiness label and patch shared by every
//! request, and the traits (ports) the decision engine calls out through.

pub mod labels;
pub mod ports;

pub use labels::*;
pub use ports::*;
