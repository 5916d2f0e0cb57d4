//! Request middleware, applied per route in `router`.

pub mod auth;
pub mod csrf;
pub mod rate_limit;
