//! Backend implementations for different execution contexts
//!
//! [`local`] runs commands on this machine. [`ssh`] is a wrapping launcher:
//! it rewrites a command into an `ssh` invocation and hands that to the
//! launcher it wraps, so the hop composes with any other launcher.

pub mod local;
pub mod ssh;
