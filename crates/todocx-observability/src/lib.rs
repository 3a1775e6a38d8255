pub mod diagnostic_log;
pub mod safe_print;
pub mod trace;

pub use diagnostic_log::DiagnosticLog;
pub use trace::{Span, Tracer};
