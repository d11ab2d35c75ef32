use serde::{Deserialize, Serialize};

/// Direction of a posted ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Credit,
    Debit,
    Discount,
}

/// A student's posted ledger entry, owned by the platform's billing tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub amount: f64,
    pub transaction_type: TransactionType,
}

/// Reconciliation totals over a student's ledger.
///
/// `manual_discount` sums already-posted DISCOUNT entries — a distinct
/// concept from policy-derived amounts, which are recomputed per evaluation
/// and never posted by this engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub credit: f64,
    pub debit: f64,
    pub manual_discount: f64,
    pub net: f64,
}

/// Single pass over the ledger; `net = credit + manual_discount - debit`.
pub fn summarize(transactions: &[Transaction]) -> TransactionSummary {
    let mut credit = 0.0;
    let mut debit = 0.0;
    let mut manual_discount = 0.0;

    for transaction in transactions {
        match transaction.transaction_type {
            TransactionType::Credit => credit += transaction.amount,
            TransactionType::Debit => debit += transaction.amount,
            TransactionType::Discount => manual_discount += transaction.amount,
        }
    }

    TransactionSummary {
        credit,
        debit,
        manual_discount,
        net: credit + manual_discount - debit,
    }
}
