use std::path::PathBuf;

use thiserror::Error;

use crate::metadata::token::Token;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Encoding Errors
/// - [`Error::Malformed`] - A structure could not be encoded or decoded
/// - [`Error::OutOfBounds`] - Attempted to read beyond a buffer boundary
/// - [`Error::StackDepth`] - A method body declares less stack than it needs
/// - [`Error::UndefinedBranchTarget`] - A branch points outside of its method body
///
/// ## Metadata Errors
/// - [`Error::TokenNotFound`] - A token does not resolve in its module
/// - [`Error::GenericNotConcrete`] - A generic parameter was found where a concrete type is required
/// - [`Error::SupportTypeMissing`] - A well-known support type is absent from the support module
/// - [`Error::LookupMethodMissing`] - The lookup-table method or its container is absent
/// - [`Error::DuplicateAnnotation`] - A method already carries an annotation of the same shape
/// - [`Error::DuplicateInstantiation`] - Two instantiations map to the same base handle
///
/// ## Pipeline Errors
/// - [`Error::PipelineState`] - An operation was requested in the wrong pipeline state
/// - [`Error::ModuleBusy`] - Another pipeline is already patching the same module
/// - [`Error::RecursionLimit`] - Maximum recursion depth exceeded
///
/// ## Publishing Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::Publish`] - Publishing failed and the previous files were restored
/// - [`Error::PublishInconsistent`] - Publishing failed and the destination is inconsistent
///
/// # Examples
///
/// ```rust,no_run
/// use dotpatch::Error;
///
/// fn report(error: &Error) {
///     match error {
///         Error::PublishInconsistent { module, symbols, .. } => {
///             eprintln!("operator attention needed: {} / {}", module.display(), symbols.display());
///         }
///         Error::Malformed { message, file, line } => {
///             eprintln!("Malformed: {} ({}:{})", message, file, line);
///         }
///         other => eprintln!("{other}"),
///     }
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A structure could not be encoded or decoded.
    ///
    /// The error includes the source location where the malformation was detected
    /// for debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while reading a buffer.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),

    /// A token does not resolve to a row of its module.
    #[error("Token {0} does not resolve in this module")]
    TokenNotFound(Token),

    /// A generic parameter appeared where only concrete types are allowed.
    ///
    /// Wrapper signatures and annotation type arguments must be fully instantiated.
    #[error("Type signature is not concrete - {0}")]
    GenericNotConcrete(String),

    /// A well-known support type could not be found in the support module.
    ///
    /// This is fatal for the whole hot-reload facility: annotations cannot be written
    /// without these types, and the lookup is not retried.
    #[error("Support type '{0}' is missing or has no default constructor")]
    SupportTypeMissing(String),

    /// The lookup-table method (or the container type that should hold it) is absent or
    /// does not declare a dictionary return type.
    #[error("Lookup table method '{0}' is missing or malformed")]
    LookupMethodMissing(String),

    /// The method already carries an annotation of this shape.
    #[error("Method {method} already carries a '{shape}' annotation")]
    DuplicateAnnotation {
        /// Method the annotation was to be attached to
        method: Token,
        /// Name of the annotation shape
        shape: &'static str,
    },

    /// Two instantiation records resolve to the same base-module handle.
    ///
    /// The lookup table would insert the same key twice, which fails at module load time.
    #[error("Base instantiation {0} was recorded more than once")]
    DuplicateInstantiation(Token),

    /// A method body declares less operand stack than its instructions require.
    #[error("Method {method} declares max stack {declared} but requires {required}")]
    StackDepth {
        /// Method whose body failed validation
        method: Token,
        /// The declared maximum stack depth
        declared: u16,
        /// The depth computed from the instruction sequence
        required: u16,
    },

    /// A branch or exception handler references an instruction outside the body.
    #[error("Branch target {target} is outside of a body with {len} instructions")]
    UndefinedBranchTarget {
        /// The referenced instruction index
        target: usize,
        /// Number of instructions in the body
        len: usize,
    },

    /// The pipeline was driven out of order.
    #[error("Pipeline for '{module}' is in state {state}, expected {expected}")]
    PipelineState {
        /// Name of the module the pipeline is bound to
        module: String,
        /// Current state
        state: &'static str,
        /// State required by the requested operation
        expected: &'static str,
    },

    /// Another pipeline currently holds the run lock for this module.
    #[error("Module '{0}' is already being patched")]
    ModuleBusy(String),

    /// Recursion limit reached.
    ///
    /// The associated value shows the recursion limit that was reached.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// Publishing failed before the destination was left inconsistent.
    ///
    /// Either nothing at the destination was touched, or the previous pair was restored.
    /// Pending files that could not be cleaned up are listed for the operator.
    #[error("Publishing '{}' failed: {message}", destination.display())]
    Publish {
        /// Destination module path
        destination: PathBuf,
        /// Description of the failing step
        message: String,
        /// Temporary files left behind
        leftovers: Vec<PathBuf>,
    },

    /// Publishing failed between the two final moves and could not be rolled back.
    ///
    /// The module and symbol files at the destination no longer belong together. This is
    /// never recovered automatically.
    #[error(
        "Publishing left '{}' and '{}' inconsistent: {message}",
        module.display(),
        symbols.display()
    )]
    PublishInconsistent {
        /// Destination module path
        module: PathBuf,
        /// Destination symbol path
        symbols: PathBuf,
        /// Description of the failing step
        message: String,
        /// Temporary and backup files left behind
        leftovers: Vec<PathBuf>,
    },
}
