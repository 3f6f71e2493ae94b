//! UI module root: exposes drawing functions for individual panels.

pub mod charts;
pub mod header;
pub mod tasks;
pub mod util;
