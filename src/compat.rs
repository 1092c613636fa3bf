//! Widget kinds and the account compatibility table.
//!
//! DESIGN
//! ======
//! Each widget kind accepts a fixed set of underlying account types. The
//! table is static; binding a widget to an account outside its kind's set
//! is refused before any request is made.

#[cfg(test)]
#[path = "compat_test.rs"]
mod tests;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// =============================================================================
// COMPATIBILITY TABLE
// =============================================================================

const SPEND_ANALYZER_TYPES: &[AccountType] = &[AccountType::Depository, AccountType::Credit];
const INVESTMENT_GRAPH_TYPES: &[AccountType] = &[AccountType::Investment, AccountType::Depository];
const TRANSACTIONS_TYPES: &[AccountType] =
    &[AccountType::Depository, AccountType::Credit, AccountType::Investment, AccountType::Loan];

// =============================================================================
// WIDGET KIND
// =============================================================================

/// Visualization a bound widget renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WidgetKind {
    #[serde(rename = "Spend Analyzer")]
    SpendAnalyzer,
    #[serde(rename = "Investment Graph")]
    InvestmentGraph,
    #[serde(rename = "Transactions")]
    Transactions,
}

impl WidgetKind {
    /// Every kind, in the order the chooser lists them.
    pub const ALL: [WidgetKind; 3] = [WidgetKind::SpendAnalyzer, WidgetKind::InvestmentGraph, WidgetKind::Transactions];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::SpendAnalyzer => "Spend Analyzer",
            Self::InvestmentGraph => "Investment Graph",
            Self::Transactions => "Transactions",
        }
    }

    /// Account types this kind can be bound to.
    #[must_use]
    pub fn accepted_types(self) -> &'static [AccountType] {
        match self {
            Self::SpendAnalyzer => SPEND_ANALYZER_TYPES,
            Self::InvestmentGraph => INVESTMENT_GRAPH_TYPES,
            Self::Transactions => TRANSACTIONS_TYPES,
        }
    }

    #[must_use]
    pub fn accepts(self, account_type: &AccountType) -> bool {
        self.accepted_types().contains(account_type)
    }
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown widget kind `{0}`")]
pub struct ParseWidgetKindError(String);

impl FromStr for WidgetKind {
    type Err = ParseWidgetKindError;

    /// Accepts the display label or a compact spelling: `Spend Analyzer`,
    /// `SpendAnalyzer`, `spend-analyzer` and `spend_analyzer` all parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match compact.as_str() {
            "spendanalyzer" => Ok(Self::SpendAnalyzer),
            "investmentgraph" => Ok(Self::InvestmentGraph),
            "transactions" => Ok(Self::Transactions),
            _ => Err(ParseWidgetKindError(s.to_owned())),
        }
    }
}

// =============================================================================
// ACCOUNT TYPE
// =============================================================================

/// Underlying type of a linked account, as reported by the account source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AccountType {
    Depository,
    Credit,
    Investment,
    Loan,
    /// Any type no widget kind accepts (`brokerage`, `other`, ...).
    Other(String),
}

impl AccountType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Depository => "depository",
            Self::Credit => "credit",
            Self::Investment => "investment",
            Self::Loan => "loan",
            Self::Other(raw) => raw.as_str(),
        }
    }
}

impl From<String> for AccountType {
    fn from(raw: String) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "depository" => Self::Depository,
            "credit" => Self::Credit,
            "investment" => Self::Investment,
            "loan" => Self::Loan,
            _ => Self::Other(raw),
        }
    }
}

impl From<AccountType> for String {
    fn from(account_type: AccountType) -> Self {
        match account_type {
            AccountType::Other(raw) => raw,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// FILTER
// =============================================================================

/// Whether an account of `account_type` may back a widget of `kind`.
#[must_use]
pub fn is_compatible(kind: WidgetKind, account_type: &AccountType) -> bool {
    kind.accepts(account_type)
}

/// Keep the items whose account type `kind` accepts, preserving order.
pub fn filter_compatible<'a, T, I, F>(kind: WidgetKind, items: I, account_type: F) -> Vec<&'a T>
where
    I: IntoIterator<Item = &'a T>,
    F: Fn(&T) -> &AccountType,
{
    items
        .into_iter()
        .filter(|item| kind.accepts(account_type(*item)))
        .collect()
}
