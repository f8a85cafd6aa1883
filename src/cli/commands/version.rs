//! Version command

use std::io::Write;

/// Embedded version, printed without a trailing newline
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn execute() {
    print!("{}", VERSION);
    let _ = std::io::stdout().flush();
}
