use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Stable identity for a [`Security`]. A plain string id, the way the
/// teacher keys `Tx::security` and `PortfolioSecurityStatus::security` by
/// the ticker string rather than a surrogate key.
pub type SecurityId = String;

#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize)]
pub enum SecurityKind {
    Stock,
    Etf,
    Bond,
    MutualFund,
}

impl Display for SecurityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SecurityKind::Stock => "stock",
            SecurityKind::Etf => "etf",
            SecurityKind::Bond => "bond",
            SecurityKind::MutualFund => "mutual-fund",
        };
        write!(f, "{}", s)
    }
}

/// Three-letter currency code a security is denominated in. Mirrors the
/// teacher's `Currency` wrapper, but a plain owned `String` is enough here
/// since the core never needs the static/dyn split the teacher uses to
/// avoid allocation on every Tx parse.
pub type CurrencyCode = String;

pub const CAD: &str = "CAD";

/// Immutable once referenced by a transaction: the core never mutates a
/// `Security` in place, only replaces the whole record via the store.
#[derive(PartialEq, Eq, Clone, Debug, Serialize, Deserialize)]
pub struct Security {
    pub id: SecurityId,
    pub symbol: String,
    pub long_name: String,
    pub currency: CurrencyCode,
    pub kind: SecurityKind,
    pub exchange: Option<String>,
}

impl Security {
    pub fn is_cad(&self) -> bool {
        self.currency.eq_ignore_ascii_case(CAD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_cad() {
        let sec = Security {
            id: "xyz".into(),
            symbol: "XYZ".into(),
            long_name: "XYZ Corp".into(),
            currency: "cad".into(),
            kind: SecurityKind::Stock,
            exchange: None,
        };
        assert!(sec.is_cad());

        let usd_sec = Security {
            currency: "USD".into(),
            ..sec
        };
        assert!(!usd_sec.is_cad());
    }
}
