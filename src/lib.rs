#![allow(clippy::new_without_default)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

pub mod directions;
pub mod logs;
pub mod navigation_tracker;
pub mod position_source;
pub mod route;
pub mod sample_filter;
pub mod utils;
