//! Connection tests driven against a scripted loopback server.

mod errors;
mod helpers;
mod tracing_spans;
