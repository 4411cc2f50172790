//! HTTP front end.
//!
//! Run-triggering endpoints answer with a server-sent event stream carrying
//! one JSON [`ProgressEvent`](crate::core::ProgressEvent) per `data:` line.
//! Precondition failures are reported as plain JSON before the stream opens.

mod error;
mod handlers;
mod routes;
mod sse;
mod state;

pub use error::ApiError;
pub use handlers::{CommitRequest, GenerateRequest};
pub use routes::build_router;
pub use sse::stream_run;
pub use state::AppState;
