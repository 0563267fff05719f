//! Identifiers for matching passes.
//!
//! Every process gets one ULID at first use (`process()`), and every matching
//! pass gets its own (`generate()`). Both are written into log events so a
//! pass can be traced back to the instance that ran it.

use once_cell::sync::Lazy;
use ulid::Ulid;

static PROCESS_RUN_ID: Lazy<String> = Lazy::new(|| Ulid::new().to_string());

/// Run id shared by everything this process does.
#[inline]
pub fn process() -> &'static str {
    &PROCESS_RUN_ID
}

/// Fresh, time-ordered id for one matching pass.
#[inline]
pub fn generate() -> String {
    Ulid::new().to_string()
}
