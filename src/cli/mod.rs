//! Operator-facing front ends over the job tracker.
//!
//! - `watch`: headless following of one job with throttled progress logs
//! - `tui`: interactive dashboard for starting and watching syncs

pub mod tui;
pub mod watch;
