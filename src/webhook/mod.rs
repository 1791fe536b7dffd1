//! Admission Webhook Module
//!
//! The decision engine, its claim resolver, and the HTTP boundary that
//! serves admission reviews from the API server.

pub mod decision;
pub mod resolver;
pub mod rest;
pub mod server;

pub use decision::*;
pub use resolver::*;
pub use rest::*;
pub use server::*;
