pub mod policy;
pub mod rate_limiter;
pub mod tracker;
