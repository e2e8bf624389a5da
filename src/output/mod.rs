//! Output processing for tool responses.
//!
//! - ANSI escape stripping of debugger output
//! - Line-based pagination
//!
//! # Example
//!
//! ```
//! use remote_debugger::output::{paginate, OutputSanitizer};
//!
//! let clean = OutputSanitizer::strip_ansi(b"\x1b[31m(dlv)\x1b[0m ");
//! assert_eq!(clean, "(dlv) ");
//!
//! let page = paginate("a\nb\nc", 1, 1);
//! assert_eq!(page.text, "b");
//! assert!(page.truncated);
//! ```

mod paginate;
mod sanitizer;

pub use paginate::{paginate, Page, DEFAULT_MAX_LINES};
pub use sanitizer::OutputSanitizer;
