// diag.rs — Backend error taxonomy
//
// Every failure inside the backend is fatal: the pass aborts, the error
// propagates to the driver, and no partial output is considered valid.
// The front end is expected to hand over internally-consistent input, so
// a `Reference` error indicates an upstream contract violation rather
// than a user mistake.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

/// A fatal backend failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// A name looked up in the program registry does not exist.
    Reference { name: String },
    /// A construct reached the backend that has no lowering
    /// (e.g. a `max` reduction, an unrecognized property shape).
    Unsupported { construct: String, name: String },
    /// A registry invariant was violated (e.g. a typedef identity
    /// requested twice with different shapes).
    Inconsistency { detail: String },
}

impl BackendError {
    pub fn reference(name: impl Into<String>) -> Self {
        BackendError::Reference { name: name.into() }
    }

    pub fn unsupported(construct: impl Into<String>, name: impl Into<String>) -> Self {
        BackendError::Unsupported {
            construct: construct.into(),
            name: name.into(),
        }
    }

    pub fn inconsistency(detail: impl Into<String>) -> Self {
        BackendError::Inconsistency {
            detail: detail.into(),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Reference { name } => {
                write!(f, "unknown name '{}' in program registry", name)
            }
            BackendError::Unsupported { construct, name } => {
                write!(f, "unsupported {} for '{}'", construct, name)
            }
            BackendError::Inconsistency { detail } => {
                write!(f, "internal inconsistency: {}", detail)
            }
        }
    }
}

impl std::error::Error for BackendError {}

pub type Result<T> = std::result::Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_reference() {
        let e = BackendError::reference("apply_edge");
        assert_eq!(format!("{e}"), "unknown name 'apply_edge' in program registry");
    }

    #[test]
    fn display_unsupported() {
        let e = BackendError::unsupported("reduction 'max'", "update");
        assert_eq!(format!("{e}"), "unsupported reduction 'max' for 'update'");
    }

    #[test]
    fn display_inconsistency() {
        let e = BackendError::inconsistency("typedef 'vec_float_4' redefined with a new shape");
        assert_eq!(
            format!("{e}"),
            "internal inconsistency: typedef 'vec_float_4' redefined with a new shape"
        );
    }
}
