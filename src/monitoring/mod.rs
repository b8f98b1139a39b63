/*!
 * Monitoring
 * Structured logging setup
 */

mod tracer;

pub use tracer::{generate_trace_id, init_tracing, worker_span};
