#![cfg_attr(not(test), no_std)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

// Must come first so the log macros are visible to every other module.
#[macro_use]
mod fmt;

pub mod command;
pub mod config;
pub mod controller;
pub mod ds18b20;
pub mod format;
pub mod onewire;
pub mod relay;
pub mod terminal;
pub mod thermometer;
pub mod units;
