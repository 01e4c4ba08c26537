//! Demo server for the tripwire panic interceptor
//!
//! Serves a handful of routes that exercise each recovery path: a healthy
//! route, a panicking route, a client-disconnect panic and a route that tags
//! its scope before failing.

pub mod app;
pub mod startup;

pub use app::{build_interceptor, json_fallback, router};
pub use startup::serve;
