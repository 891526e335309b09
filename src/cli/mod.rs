//! CLI module for the menu-banner library
//!
//! This module is only available when the "cli" feature is enabled.

mod config;
#[path = "main.rs"]
mod main_impl;

pub use main_impl::{main, BannerArgs, Cli, Command, CopyArgs, EvaluateArgs, WeightsArgs};
