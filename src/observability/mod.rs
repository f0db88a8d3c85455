//! Observability hooks for the dispatch pipeline.
//!
//! Routing decisions are logged through `tracing`. Latency of matched
//! targets goes to an optional [`SpanTracker`]; [`Monitor`] is the bundled
//! in-process implementation whose snapshot operational tooling can poll.

mod monitor;

pub use monitor::{Monitor, SpanId, SpanStats, SpanTracker};
