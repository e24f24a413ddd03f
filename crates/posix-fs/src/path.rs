//! Path-component validation shared by every creating operation.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;

use thiserror::Error;

/// Longest accepted path component in bytes, the common POSIX `NAME_MAX`.
pub const NAME_MAX: usize = 255;

/// Rejection reasons for a single path component.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum PathComponentError {
    /// The component is the empty string.
    #[error("path component is empty")]
    Empty,
    /// `.` never names a real child.
    #[error("path component '.' is not allowed")]
    Dot,
    /// `..` never names a real child.
    #[error("path component '..' is not allowed")]
    DotDot,
    /// Component contains a NUL byte.
    #[error("path component contains a NUL byte")]
    Nul,
    /// Component contains a `/`.
    #[error("path component contains a '/'")]
    Separator,
    /// Component exceeds [`NAME_MAX`] bytes.
    #[error("path component is {0} bytes, longer than NAME_MAX ({NAME_MAX})")]
    TooLong(usize),
}

/// Validates one path component against the POSIX naming rules.
///
/// # Errors
///
/// Returns the first violated rule: empty, `.`, `..`, embedded NUL or `/`,
/// or longer than [`NAME_MAX`] bytes.
pub fn validate_component(name: &OsStr) -> Result<(), PathComponentError> {
    let bytes = name.as_bytes();
    if bytes.is_empty() {
        return Err(PathComponentError::Empty);
    }
    if bytes == b"." {
        return Err(PathComponentError::Dot);
    }
    if bytes == b".." {
        return Err(PathComponentError::DotDot);
    }
    if bytes.contains(&0) {
        return Err(PathComponentError::Nul);
    }
    if bytes.contains(&b'/') {
        return Err(PathComponentError::Separator);
    }
    if bytes.len() > NAME_MAX {
        return Err(PathComponentError::TooLong(bytes.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    #[test]
    fn ordinary_names_pass() {
        for name in ["a", "file.txt", "with space", "Ünïcode", "-", "_"] {
            assert_eq!(validate_component(OsStr::new(name)), Ok(()), "{name}");
        }
    }

    #[test]
    fn reserved_names_are_rejected() {
        assert_eq!(
            validate_component(OsStr::new("")),
            Err(PathComponentError::Empty)
        );
        assert_eq!(
            validate_component(OsStr::new(".")),
            Err(PathComponentError::Dot)
        );
        assert_eq!(
            validate_component(OsStr::new("..")),
            Err(PathComponentError::DotDot)
        );
    }

    #[test]
    fn separator_is_rejected() {
        assert_eq!(
            validate_component(OsStr::new("a/b")),
            Err(PathComponentError::Separator)
        );
    }

    #[test]
    fn nul_is_rejected() {
        use std::os::unix::ffi::OsStringExt;
        let name = OsString::from_vec(vec![b'a', 0, b'b']);
        assert_eq!(validate_component(&name), Err(PathComponentError::Nul));
    }

    #[test]
    fn name_max_boundary() {
        let ok = "x".repeat(NAME_MAX);
        assert_eq!(validate_component(OsStr::new(&ok)), Ok(()));

        let long = "x".repeat(NAME_MAX + 1);
        assert_eq!(
            validate_component(OsStr::new(&long)),
            Err(PathComponentError::TooLong(NAME_MAX + 1))
        );
    }
}
