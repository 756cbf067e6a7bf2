//! Core modules: local state, the evidence pack, and the gate that fills it.
//!
//! Check steps and the intake surfaces live in [`crate::plugins`]; everything
//! here is shared by all of them.

pub mod assets;
pub mod backend;
pub mod broker;
pub mod config;
pub mod db;
pub mod error;
pub mod evidence;
pub mod gate;
pub mod history;
pub mod identity;
pub mod issues;
pub mod logging;
pub mod output;
pub mod recorder;
pub mod scaffold;
pub mod schemas;
pub mod store;
pub mod time;
pub mod tui;
pub mod validate;
