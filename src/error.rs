use core::fmt;

/// Result alias for `canopy`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by hierarchy loading and fragment processing.
///
/// Two tiers share this enum. Input errors ([`Io`](Error::Io),
/// [`MalformedHierarchy`](Error::MalformedHierarchy),
/// [`LeafCountMismatch`](Error::LeafCountMismatch),
/// [`CrossTreeFragment`](Error::CrossTreeFragment)) are unrecoverable:
/// there is no well-defined partial state to continue from, and drivers
/// should terminate on them. The remaining variants are violated
/// preconditions surfaced as typed errors rather than silent NaNs.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The hierarchy file could not be read.
    Io {
        /// Path that failed to open or read.
        path: String,
        /// Underlying I/O error message.
        message: String,
    },

    /// The hierarchy specification violates the format or the
    /// interval-contiguity invariant.
    MalformedHierarchy {
        /// 1-based line number in the hierarchy input.
        line: usize,
        /// What was wrong.
        message: String,
    },

    /// The number of leaves assigned during loading does not match the
    /// declared header count.
    LeafCountMismatch {
        /// Leaf count declared in the header.
        declared: usize,
        /// Leaf count actually assigned.
        assigned: usize,
    },

    /// A fragment's hits span more than one root tree.
    CrossTreeFragment {
        /// Human-readable fragment identifier.
        fragment: String,
    },

    /// A fragment's hits are unusable (unsorted, unknown target, or
    /// zero total likelihood).
    DegenerateFragment {
        /// Human-readable fragment identifier.
        fragment: String,
        /// What was wrong.
        message: &'static str,
    },

    /// A supplied initial abundance was the log-zero sentinel.
    NonPositiveAlpha {
        /// Leaf index with the offending value.
        leaf: usize,
    },

    /// Input length mismatch (usize).
    DimensionMismatch {
        /// Expected length.
        expected: usize,
        /// Found length.
        found: usize,
    },

    /// Invalid parameter value.
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: &'static str,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io { path, message } => {
                write!(f, "could not read hierarchy file '{path}': {message}")
            }
            Error::MalformedHierarchy { line, message } => {
                write!(f, "malformed hierarchy at line {line}: {message}")
            }
            Error::LeafCountMismatch { declared, assigned } => {
                write!(f, "leaf count mismatch: header declares {declared}, assigned {assigned}")
            }
            Error::CrossTreeFragment { fragment } => {
                write!(f, "fragment '{fragment}' accesses multiple root trees")
            }
            Error::DegenerateFragment { fragment, message } => {
                write!(f, "fragment '{fragment}' is degenerate: {message}")
            }
            Error::NonPositiveAlpha { leaf } => {
                write!(f, "initial abundance for leaf {leaf} must be strictly positive")
            }
            Error::DimensionMismatch { expected, found } => {
                write!(f, "dimension mismatch: expected {expected}, found {found}")
            }
            Error::InvalidParameter { name, message } => {
                write!(f, "invalid parameter '{name}': {message}")
            }
        }
    }
}

impl std::error::Error for Error {}
