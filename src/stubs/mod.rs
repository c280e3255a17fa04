//! Test doubles for the collaborator traits.
pub mod checker;
pub mod sampler;
#[cfg(unix)]
pub mod script;
