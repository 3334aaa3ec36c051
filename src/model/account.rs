use std::fmt::Display;

use serde::{Deserialize, Serialize};

pub type AccountId = String;

/// Generalizes the teacher's `Affiliate` (a registered/non-registered,
/// dedup-by-name axis of "who holds this") into the spec's `Account`.
/// Unlike `Affiliate`, there's no `"(R)"` string-suffix parsing here: an
/// `Account` is a normal typed record, registration is a first-class enum.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize)]
pub enum RegistrationKind {
    NonRegistered,
    Tfsa,
    Rrsp,
    Resp,
    Lira,
    Rrif,
}

impl Display for RegistrationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RegistrationKind::NonRegistered => "non-registered",
            RegistrationKind::Tfsa => "TFSA",
            RegistrationKind::Rrsp => "RRSP",
            RegistrationKind::Resp => "RESP",
            RegistrationKind::Lira => "LIRA",
            RegistrationKind::Rrif => "RRIF",
        };
        write!(f, "{}", s)
    }
}

#[derive(PartialEq, Eq, Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub display_name: String,
    pub registration: RegistrationKind,
}

impl Account {
    /// Registered accounts exempt their sells from capital-gain reporting
    /// and from superficial-loss denial, the same role
    /// `Affiliate::registered()` plays in the teacher (`total_acb: None`
    /// for registered affiliates).
    pub fn is_registered(&self) -> bool {
        !matches!(self.registration, RegistrationKind::NonRegistered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_registered() {
        let non_reg = Account {
            id: "a1".into(),
            display_name: "Non-Registered".into(),
            registration: RegistrationKind::NonRegistered,
        };
        assert!(!non_reg.is_registered());

        let tfsa = Account {
            registration: RegistrationKind::Tfsa,
            ..non_reg
        };
        assert!(tfsa.is_registered());
    }
}
