//! Sectioning an invoice list by day or by month for display.

use chrono::NaiveDate;

use crate::invoice::Invoice;
use crate::period::MonthKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Grouping {
    Day,
    #[default]
    Month,
}

impl Grouping {
    /// The other option (the list screen toggles between the two).
    pub fn toggled(self) -> Self {
        match self {
            Grouping::Day => Grouping::Month,
            Grouping::Month => Grouping::Day,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKey {
    Day(NaiveDate),
    Month(MonthKey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceSection {
    pub key: SectionKey,
    /// Sum of the section's invoice amounts.
    pub total_amount: u64,
    pub invoices: Vec<Invoice>,
}

/// Split `invoices` into sections. Sections appear in order of first occurrence
/// and keep input order within.
pub fn group_invoices(invoices: &[Invoice], grouping: Grouping) -> Vec<InvoiceSection> {
    let mut sections: Vec<InvoiceSection> = Vec::new();

    for invoice in invoices {
        let key = match grouping {
            Grouping::Day => SectionKey::Day(invoice.date()),
            Grouping::Month => SectionKey::Month(invoice.month_key()),
        };

        match sections.iter_mut().find(|s| s.key == key) {
            Some(section) => {
                section.total_amount = section.total_amount.saturating_add(invoice.amount());
                section.invoices.push(invoice.clone());
            }
            None => sections.push(InvoiceSection {
                key,
                total_amount: invoice.amount(),
                invoices: vec![invoice.clone()],
            }),
        }
    }

    sections
}
