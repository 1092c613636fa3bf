//! Selectable account options for the binder's second step.

use time::OffsetDateTime;

use crate::compat::{AccountType, WidgetKind, filter_compatible};
use crate::model::AccountRef;
use crate::remote::AccountListing;

/// One linked account the user may bind, with its display fields resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountOption {
    pub account: AccountRef,
    pub account_type: AccountType,
    pub institution_name: String,
    pub account_name: String,
    pub mask: Option<String>,
    pub added_at: Option<OffsetDateTime>,
}

impl AccountOption {
    /// Institution and account name, e.g. `First Bank Everyday Checking`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.institution_name, self.account_name).trim().to_owned()
    }

    /// `••••1234`, when the source reported a mask.
    #[must_use]
    pub fn masked(&self) -> Option<String> {
        self.mask.as_deref().map(|mask| format!("••••{mask}"))
    }

    /// `Added: March 5, 2024`, when the source reported a link date.
    #[must_use]
    pub fn added(&self) -> Option<String> {
        self.added_at
            .map(|at| format!("Added: {} {}, {}", at.month(), at.day(), at.year()))
    }
}

/// Options for every account in `listing` that `kind` accepts, in listing
/// order. Accounts whose institution is missing get an empty institution
/// name rather than being dropped.
#[must_use]
pub fn build_options(kind: WidgetKind, listing: &AccountListing) -> Vec<AccountOption> {
    filter_compatible(kind, &listing.accounts, |a| &a.account_type)
        .into_iter()
        .map(|account| AccountOption {
            account: account.account_ref(),
            account_type: account.account_type.clone(),
            institution_name: listing
                .institution_name(account.institution_id)
                .unwrap_or_default()
                .to_owned(),
            account_name: account.name.clone(),
            mask: account.mask.clone(),
            added_at: account.created_at,
        })
        .collect()
}
