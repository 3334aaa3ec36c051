use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::transaction::TxType;

/// One computed intermediate in the Algebra's execution, in the order it
/// was computed. The teacher leaves this trail as `tracing::debug!` log
/// lines inside `delta_for_tx`; here it's captured as structured data so
/// the audit is reproducible and presentable, not just loggable.
#[derive(PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct AuditStep {
    pub description: String,
    pub formula: Option<String>,
    pub values: BTreeMap<String, String>,
    pub result: Option<String>,
}

impl AuditStep {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            formula: None,
            values: BTreeMap::new(),
            result: None,
        }
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    pub fn with_value(mut self, label: impl Into<String>, value: impl std::fmt::Display) -> Self {
        self.values.insert(label.into(), value.to_string());
        self
    }

    pub fn with_result(mut self, result: impl std::fmt::Display) -> Self {
        self.result = Some(result.to_string());
        self
    }
}

#[derive(PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct SuperficialLossAudit {
    pub is_superficial: bool,
    pub loss_amount: String,
    pub related_transaction_ids: Vec<String>,
    pub explanation: String,
    pub adjustment_required: String,
}

#[derive(PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct AuditTrail {
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub steps: Vec<AuditStep>,
    pub summary: String,
    pub superficial_loss: Option<SuperficialLossAudit>,
}

impl AuditTrail {
    pub fn new(tx_type: TxType) -> Self {
        Self {
            tx_type,
            steps: Vec::new(),
            summary: String::new(),
            superficial_loss: None,
        }
    }

    pub fn push(&mut self, step: AuditStep) {
        self.steps.push(step);
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }
}
