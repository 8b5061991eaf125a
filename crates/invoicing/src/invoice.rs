use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use receipts_core::{DomainError, DomainResult, Entity, InvoiceId};

use crate::period::MonthKey;

/// How the receipt entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceKind {
    Manual,
    Scan,
    Carrier,
}

/// A purchased item listed on a receipt. Owned by its invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDetail {
    pub name: String,
}

impl InvoiceDetail {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Unvalidated receipt fields as typed in by a user (or produced by a scanner).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceDraft {
    pub kind: InvoiceKind,
    pub shop_name: String,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub number_prefix: String,
    pub number_suffix: String,
    /// Signed so that a negative entry can be reported instead of wrapped.
    pub amount: i64,
    pub details: Vec<InvoiceDetail>,
}

/// A saved receipt.
///
/// Invariants (checked on construction):
/// - the date is a real calendar date
/// - `number_prefix` is two upper-case ASCII letters
/// - `number_suffix` is eight ASCII digits
/// - `amount` fits in an `i64`
///
/// Serialize-only: every `Invoice` in memory came through `from_draft`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invoice {
    id: InvoiceId,
    kind: InvoiceKind,
    shop_name: String,
    date: NaiveDate,
    number_prefix: String,
    number_suffix: String,
    /// Amount in smallest currency unit.
    amount: u64,
    details: Vec<InvoiceDetail>,
}

impl Invoice {
    /// Validate a draft and give it a fresh identity.
    pub fn new(draft: InvoiceDraft) -> DomainResult<Self> {
        Self::from_draft(InvoiceId::new(), draft)
    }

    /// Validate a draft under an explicit identity.
    pub fn from_draft(id: InvoiceId, draft: InvoiceDraft) -> DomainResult<Self> {
        let date = NaiveDate::from_ymd_opt(draft.year, draft.month, draft.day).ok_or_else(|| {
            DomainError::validation(format!(
                "{}-{}-{} is not a calendar date",
                draft.year, draft.month, draft.day
            ))
        })?;

        let number_prefix = normalize_prefix(&draft.number_prefix)?;

        if !is_ticket_suffix(&draft.number_suffix) {
            return Err(DomainError::validation(
                "number suffix must be exactly eight digits",
            ));
        }

        let amount = u64::try_from(draft.amount)
            .map_err(|_| DomainError::validation("amount cannot be negative"))?;

        Ok(Self {
            id,
            kind: draft.kind,
            shop_name: draft.shop_name,
            date,
            number_prefix,
            number_suffix: draft.number_suffix,
            amount,
            details: draft.details,
        })
    }

    /// Apply edited fields, keeping identity and kind.
    pub fn revise(&self, draft: InvoiceDraft) -> DomainResult<Self> {
        Self::from_draft(self.id, InvoiceDraft { kind: self.kind, ..draft })
    }

    /// Current fields as an editable draft.
    pub fn to_draft(&self) -> InvoiceDraft {
        InvoiceDraft {
            kind: self.kind,
            shop_name: self.shop_name.clone(),
            year: self.year(),
            month: self.month(),
            day: self.day(),
            number_prefix: self.number_prefix.clone(),
            number_suffix: self.number_suffix.clone(),
            // Always in range: `from_draft` is the only constructor.
            amount: i64::try_from(self.amount).unwrap_or(i64::MAX),
            details: self.details.clone(),
        }
    }

    /// Same receipt with its item list replaced.
    pub fn with_details(mut self, details: Vec<InvoiceDetail>) -> Self {
        self.details = details;
        self
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn kind(&self) -> InvoiceKind {
        self.kind
    }

    pub fn shop_name(&self) -> &str {
        &self.shop_name
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn year(&self) -> i32 {
        self.date.year()
    }

    pub fn month(&self) -> u32 {
        self.date.month()
    }

    pub fn day(&self) -> u32 {
        self.date.day()
    }

    pub fn month_key(&self) -> MonthKey {
        MonthKey::of(self.date)
    }

    pub fn number_prefix(&self) -> &str {
        &self.number_prefix
    }

    pub fn number_suffix(&self) -> &str {
        &self.number_suffix
    }

    /// `"AB-12345678"`
    pub fn ticket_number(&self) -> String {
        format!("{}-{}", self.number_prefix, self.number_suffix)
    }

    /// True when both receipts carry the same ticket number.
    pub fn same_ticket(&self, prefix: &str, suffix: &str) -> bool {
        self.number_prefix.eq_ignore_ascii_case(prefix) && self.number_suffix == suffix
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn details(&self) -> &[InvoiceDetail] {
        &self.details
    }
}

impl Entity for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Upper-cased prefix, or a validation error unless it is two ASCII letters.
pub fn normalize_prefix(prefix: &str) -> DomainResult<String> {
    if prefix.len() == 2 && prefix.bytes().all(|b| b.is_ascii_alphabetic()) {
        Ok(prefix.to_ascii_uppercase())
    } else {
        Err(DomainError::validation(
            "number prefix must be exactly two letters",
        ))
    }
}

/// Eight ASCII digits.
pub fn is_ticket_suffix(suffix: &str) -> bool {
    suffix.len() == 8 && suffix.bytes().all(|b| b.is_ascii_digit())
}
