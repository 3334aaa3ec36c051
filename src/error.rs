use std::fmt::Display;

/// Error taxonomy for the ledger core. Kept as a hand-written enum (no
/// thiserror dependency) matching the Validation / Resource / External /
/// Logic groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // Validation
    MissingRequiredField(String),
    UnknownType(String),
    InvalidRatio(String),
    InsufficientShares(String),
    PrecisionLoss(String),

    // Resource
    NotFound(String),

    // External
    FxUnavailable(String),
    PersistenceFailure(String),

    // Logic (defensive; should never be user-caused)
    InvariantViolation(String),
}

impl LedgerError {
    /// HTTP status code §6 mapping: NotFound -> 404, validation -> 400,
    /// everything else -> 500.
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::NotFound(_) => 404,
            LedgerError::MissingRequiredField(_)
            | LedgerError::UnknownType(_)
            | LedgerError::InvalidRatio(_)
            | LedgerError::InsufficientShares(_)
            | LedgerError::PrecisionLoss(_) => 400,
            LedgerError::FxUnavailable(_)
            | LedgerError::PersistenceFailure(_)
            | LedgerError::InvariantViolation(_) => 500,
        }
    }
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::MissingRequiredField(m) => write!(f, "missing required field: {m}"),
            LedgerError::UnknownType(m) => write!(f, "unknown transaction type: {m}"),
            LedgerError::InvalidRatio(m) => write!(f, "invalid ratio: {m}"),
            LedgerError::InsufficientShares(m) => write!(f, "insufficient shares: {m}"),
            LedgerError::PrecisionLoss(m) => write!(f, "precision loss: {m}"),
            LedgerError::NotFound(m) => write!(f, "not found: {m}"),
            LedgerError::FxUnavailable(m) => write!(f, "fx rate unavailable: {m}"),
            LedgerError::PersistenceFailure(m) => write!(f, "persistence failure: {m}"),
            LedgerError::InvariantViolation(m) => write!(f, "invariant violation: {m}"),
        }
    }
}

impl std::error::Error for LedgerError {}

/// §6 HTTP error mapping, without pulling in a web framework.
impl From<&LedgerError> for (u16, String) {
    fn from(e: &LedgerError) -> Self {
        (e.http_status(), e.to_string())
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
