//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract — scripts rely on them.
//!
//! # Exit Codes
//!
//! | Code | Meaning                                                   |
//! |------|-----------------------------------------------------------|
//! | 0    | Success, no drift                                         |
//! | 1    | Drift found (missing keys, conflicts, or deltas)          |
//! | 2    | CLI usage error (bad args, missing file)                  |
//! | 3    | Invalid run profile                                       |
//! | 4    | Source table could not be ingested                        |
//! | 5    | Report, audit log, or package could not be written        |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant below
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed and the sources agree.
pub const EXIT_SUCCESS: u8 = 0;

/// Drift found. Like `diff(1)`, exit 1 means "sources differ."
pub const EXIT_DRIFT: u8 = 1;

/// Usage error - bad arguments, missing profile file.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Reconciliation (3-5)
// =============================================================================

/// Profile failed to parse or validate, or the engine rejected its input.
pub const EXIT_INVALID_PROFILE: u8 = 3;

/// A source file could not be read, parsed, or matched to its patterns.
pub const EXIT_INGEST: u8 = 4;

/// JSON, workbook, audit log, or zip output failed.
pub const EXIT_REPORT: u8 = 5;
