//! HTTP query surface and command-line interface.

mod cli;
pub mod handlers;
mod http;
pub mod metrics;
mod middleware;
pub mod request;
pub mod response;

pub use cli::{CliArgs, Mode};
pub use http::{QueryServer, build_router};
