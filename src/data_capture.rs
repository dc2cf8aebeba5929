//! Stream capture: per-direction forwarding, line reassembly and the
//! session record sink.

pub mod forwarder;
pub mod line_buffer;
pub mod log_sink;
pub mod types;

pub use forwarder::{ForwardOutcome, ForwardStats, StreamForwarder};
pub use line_buffer::LineBuffer;
pub use log_sink::{LogSink, SinkHandle, SinkStats};
pub use types::{Direction, LogRecord, Payload};
