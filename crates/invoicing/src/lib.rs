//! Receipt domain module.
//!
//! This crate contains the business rules for saved receipts: filing periods,
//! ticket-number validation, prize matching and list grouping, implemented
//! purely as deterministic domain logic (no IO, no storage, no threads).

pub mod grouping;
pub mod invoice;
pub mod period;
pub mod prize;

pub use grouping::{Grouping, InvoiceSection, SectionKey, group_invoices};
pub use invoice::{
    Invoice, InvoiceDetail, InvoiceDraft, InvoiceKind, is_ticket_suffix, normalize_prefix,
};
pub use period::{InvoicePeriod, MonthKey};
pub use prize::{
    PrizeDrawRecord, PrizeTier, WinningInvoice, common_suffix_len, find_winners, match_ticket,
    total_prize,
};
