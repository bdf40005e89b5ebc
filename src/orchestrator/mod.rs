//! Application-level orchestration.
//!
//! This module owns the session state machine, the controller that drives it
//! from UI commands, and post-parse processing such as exports. UI/CLI layers
//! call into this module to keep responsibilities separated.

mod controller;
mod post_process;
mod workflow;


pub(crate) use controller::{run_controller, UiCommand};
pub(crate) use post_process::process_results;
