//! Run bookkeeping
//!
//! Launches are recorded as soon as the runs are started, so `status` works while a batch is
//! still waiting. Outcomes are written once the launcher stops waiting.

pub mod state;
pub mod record;
pub mod load;
