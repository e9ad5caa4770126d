//! CLI Exit Code Registry
//!
//! Exit codes are part of the shell contract.
//!
//! | Code | Description                                         |
//! |------|-----------------------------------------------------|
//! | 0    | Success                                             |
//! | 1    | General error (unspecified)                         |
//! | 2    | CLI usage error (bad args, missing file)            |
//! | 3    | Storage backend could not be opened                 |
//! | 4    | Import rejected (malformed or incomplete record)    |

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// The configured backend (directory or SQLite file) could not be opened.
pub const EXIT_STORAGE: u8 = 3;

/// `import` rejected its input; stored preferences are unchanged.
pub const EXIT_IMPORT_REJECTED: u8 = 4;
