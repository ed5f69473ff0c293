use core::fmt::Display;
use std::borrow::Cow;

/// Error types used throughout the `patchlink` library.
/// These errors represent the failure conditions that can occur while
/// compiling, linking, and patching code into a fixed target image.
#[derive(Debug)]
pub enum Error {
    /// A required configuration key is missing or a configuration value is
    /// unparsable.
    Config {
        /// A descriptive message about the configuration error.
        msg: Cow<'static, str>,
    },

    /// An external toolchain process could not be started or exited with a
    /// nonzero status.
    Tool {
        /// A descriptive message about the tool invocation error.
        msg: Cow<'static, str>,
    },

    /// Output produced by an external tool could not be parsed.
    ///
    /// Malformed or unexpected output is never silently tolerated; the
    /// message names the file or stage whose output was rejected.
    Parse {
        /// A descriptive message about the parse error.
        msg: Cow<'static, str>,
    },

    /// An instruction slot did not hold the expected no-operation encoding.
    ///
    /// This signals either a double-patch attempt or a misconfigured
    /// injection address.
    Patch {
        /// A descriptive message about the patch precondition violation.
        msg: Cow<'static, str>,
    },

    /// A referenced file, section, or address does not exist in the
    /// expected input.
    NotFound {
        /// A descriptive message about the missing item.
        msg: Cow<'static, str>,
    },

    /// An error occurred while reading or writing local files.
    Io {
        /// A descriptive message about the I/O error.
        msg: Cow<'static, str>,
    },
}

impl Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Config { msg } => write!(f, "configuration error: {msg}"),
            Error::Tool { msg } => write!(f, "tool invocation error: {msg}"),
            Error::Parse { msg } => write!(f, "parse error: {msg}"),
            Error::Patch { msg } => write!(f, "patch precondition error: {msg}"),
            Error::NotFound { msg } => write!(f, "not found: {msg}"),
            Error::Io { msg } => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

/// Creates a configuration error with the specified message.
#[cold]
#[inline(never)]
pub(crate) fn config_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Config { msg: msg.into() }
}

/// Creates a tool invocation error with the specified message.
#[cold]
#[inline(never)]
pub(crate) fn tool_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Tool { msg: msg.into() }
}

/// Creates a parse error with the specified message.
#[cold]
#[inline(never)]
pub(crate) fn parse_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Parse { msg: msg.into() }
}

/// Creates a patch precondition error with the specified message.
#[cold]
#[inline(never)]
pub(crate) fn patch_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Patch { msg: msg.into() }
}

/// Creates a not-found error with the specified message.
#[cold]
#[inline(never)]
pub(crate) fn not_found_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::NotFound { msg: msg.into() }
}

/// Creates an I/O error with the specified message.
#[cold]
#[inline(never)]
pub(crate) fn io_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Io { msg: msg.into() }
}
