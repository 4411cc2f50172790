//! Observability utilities: subscriber setup and stage timing.

mod tracing;

pub use self::tracing::{init_tracing, LogFormat, SpanTimer, StageSpanAttributes};
