// Error handling for the latent runtime

use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors surfaced while recording operations against a placeholder or
/// replaying a captured ledger against the real subject.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// Placeholder bookkeeping was read through an ordinary member access
    /// instead of the capability view.
    #[error("access denied: '{member}' is placeholder bookkeeping, reachable only through the capability view")]
    AccessDenied { member: String },

    /// A facade was handed a ticket it never issued.
    #[error("unknown world: ticket #{0} was never registered with this facade")]
    UnknownWorld(u64),

    #[error("type error in {operation}: expected {expected}, got {actual}")]
    TypeError {
        expected: String,
        actual: String,
        operation: String,
    },

    #[error("arity mismatch in {function}: expected {expected}, got {actual}")]
    ArityMismatch {
        function: String,
        expected: String,
        actual: usize,
    },

    #[error("member not found: '{member}' on {type_name}")]
    MemberNotFound { member: String, type_name: String },

    #[error("value of type {0} is not callable")]
    NotCallable(String),

    #[error("division by zero")]
    DivisionByZero,

    /// Integer arithmetic whose operand or result falls outside the
    /// representable range.
    #[error("arithmetic overflow in {operation}")]
    ArithmeticOverflow { operation: String },

    /// A recorder's ledger replays exactly once; a second or re-entrant
    /// replay fails here.
    #[error("ledger already replayed")]
    AlreadyReplayed,

    /// Resolution is monotonic: a placeholder takes a subject at most once.
    #[error("placeholder already resolved")]
    AlreadyResolved,

    #[error("unsupported operation: {operation} on {type_name}")]
    UnsupportedOperation {
        operation: String,
        type_name: String,
    },

    /// Logic errors in the engine itself, e.g. replay reaching a record
    /// whose origin has no subject yet.
    #[error("internal error: {0}")]
    InternalError(String),
}
