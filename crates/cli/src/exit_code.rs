//! Process exit codes shared by both executables.

use std::fmt;

/// Exit codes for `parpack` and `parunpack`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful completion.
    Ok = 0,

    /// Argument or usage error; usage was printed to stderr.
    Syntax = 1,

    /// Runtime failure: I/O, protocol violation, collision without force.
    Runtime = 2,
}

impl ExitCode {
    /// The numeric exit code value.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Creates an exit code from an i32 value.
    #[must_use]
    pub const fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Ok),
            1 => Some(Self::Syntax),
            2 => Some(Self::Runtime),
            _ => None,
        }
    }

    /// A human-readable description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Ok => "success",
            Self::Syntax => "syntax or usage error",
            Self::Runtime => "runtime I/O error",
        }
    }

    /// Whether this represents a successful exit.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        Self::from(code.as_i32().clamp(0, 255) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_match_the_cli_contract() {
        assert_eq!(ExitCode::Ok.as_i32(), 0);
        assert_eq!(ExitCode::Syntax.as_i32(), 1);
        assert_eq!(ExitCode::Runtime.as_i32(), 2);
    }

    #[test]
    fn from_i32_round_trips() {
        for code in [ExitCode::Ok, ExitCode::Syntax, ExitCode::Runtime] {
            assert_eq!(ExitCode::from_i32(code.as_i32()), Some(code));
        }
        assert_eq!(ExitCode::from_i32(3), None);
    }

    #[test]
    fn only_ok_is_success() {
        assert!(ExitCode::Ok.is_success());
        assert!(!ExitCode::Syntax.is_success());
        assert!(!ExitCode::Runtime.is_success());
    }
}
