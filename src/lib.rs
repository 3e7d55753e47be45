#![allow(unused_assignments)] // thiserror/miette proc macros trigger false positives

pub mod backend;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod eligibility;
pub mod error;
pub mod helpers;
pub mod ledger;
pub mod logging;
pub mod nav;
pub mod network;
pub mod output;
pub mod paths;
pub mod progress;
pub mod store;
pub mod vm_state;
