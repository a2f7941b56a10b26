//! # west-cli
//!
//! The `westport` binary: sets up a coordination node, issues provisioning
//! tokens for new devices and runs the node.
//!
//! The encryption passphrase is read from `WESTPORT_PASSPHRASE`; nothing
//! here prompts interactively.

pub mod cli;

pub use cli::run;
