//! # Runtime Module
//!
//! Runtime components for the chaos controller: initialization, watch loop
//! and error policy.

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;

pub use error_policy::*;
pub use initialization::*;
pub use watch_loop::*;
