//! Runtime configuration for a triage deployment.
//!
//! Configuration is an explicit value constructed once in `main` and passed
//! into the store client and pipeline — there is no global config state, so
//! tests inject fixtures directly without touching the process environment.
//!
//! ## Loading Order
//!
//! 1. `TRIAGE_CONFIG` environment variable (path to TOML file)
//! 2. `triage.toml` in the current working directory
//! 3. Built-in defaults
//!
//! Credentials are never read from the TOML file; the config only names the
//! environment variables that hold them (`.env` files are honored).

mod settings;

pub use settings::*;
