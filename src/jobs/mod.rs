//! Client-facing job operations and the live status cache.

pub mod live_status;
pub mod service;

pub use live_status::{LiveStatus, LiveStatusCache};
pub use service::{JobService, JobStatusView};
