//! Prize tiers and ticket matching against a period's draw.

use serde::{Deserialize, Serialize};

use receipts_core::{DomainError, DomainResult};

use crate::invoice::{Invoice, is_ticket_suffix};
use crate::period::InvoicePeriod;

/// Award levels, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrizeTier {
    Special,
    Grand,
    First,
    Second,
    Third,
    Fourth,
    Fifth,
    Sixth,
}

/// Tier for a given longest-common-suffix length against the first-prize numbers.
/// Index is the suffix length; lengths past the end never occur for 8-digit tickets.
const SIMILARITY_TIERS: [Option<PrizeTier>; 8] = [
    None,
    None,
    None,
    Some(PrizeTier::Sixth),
    Some(PrizeTier::Fifth),
    Some(PrizeTier::Fourth),
    Some(PrizeTier::Third),
    Some(PrizeTier::Second),
];

impl PrizeTier {
    /// Prize money in smallest currency unit.
    pub fn amount(&self) -> u64 {
        match self {
            PrizeTier::Special => 10_000_000,
            PrizeTier::Grand => 2_000_000,
            PrizeTier::First => 200_000,
            PrizeTier::Second => 40_000,
            PrizeTier::Third => 10_000,
            PrizeTier::Fourth => 4_000,
            PrizeTier::Fifth => 1_000,
            PrizeTier::Sixth => 200,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PrizeTier::Special => "special prize",
            PrizeTier::Grand => "grand prize",
            PrizeTier::First => "first prize",
            PrizeTier::Second => "second prize",
            PrizeTier::Third => "third prize",
            PrizeTier::Fourth => "fourth prize",
            PrizeTier::Fifth => "fifth prize",
            PrizeTier::Sixth => "sixth prize",
        }
    }

    /// Map a common-suffix length to a tier.
    ///
    /// Lengths outside the table are an invariant violation: they cannot come
    /// out of well-formed 8-digit numbers once exact matches are ruled out.
    pub fn from_common_suffix(len: usize) -> DomainResult<Option<PrizeTier>> {
        SIMILARITY_TIERS.get(len).copied().ok_or_else(|| {
            DomainError::invariant(format!("common suffix length {len} has no prize tier"))
        })
    }
}

impl core::fmt::Display for PrizeTier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

/// Winning numbers announced for one filing period. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrizeDrawRecord {
    period: InvoicePeriod,
    special_number: String,
    grand_number: String,
    first_numbers: Vec<String>,
}

impl PrizeDrawRecord {
    /// Every number must be eight digits. The count of first-prize numbers is not
    /// limited here.
    pub fn new(
        period: InvoicePeriod,
        special_number: impl Into<String>,
        grand_number: impl Into<String>,
        first_numbers: Vec<String>,
    ) -> DomainResult<Self> {
        let special_number = special_number.into();
        let grand_number = grand_number.into();

        for (what, number) in [("special", &special_number), ("grand", &grand_number)]
            .into_iter()
            .chain(first_numbers.iter().map(|n| ("first", n)))
        {
            if !is_ticket_suffix(number) {
                return Err(DomainError::validation(format!(
                    "{what} prize number {number:?} must be exactly eight digits"
                )));
            }
        }

        Ok(Self {
            period,
            special_number,
            grand_number,
            first_numbers,
        })
    }

    pub fn period(&self) -> InvoicePeriod {
        self.period
    }

    pub fn special_number(&self) -> &str {
        &self.special_number
    }

    pub fn grand_number(&self) -> &str {
        &self.grand_number
    }

    pub fn first_numbers(&self) -> &[String] {
        &self.first_numbers
    }
}

/// An invoice that won something.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinningInvoice {
    pub tier: PrizeTier,
    pub invoice: Invoice,
}

/// Count of equal characters from the right end inward, up to the first mismatch.
pub fn common_suffix_len(a: &str, b: &str) -> usize {
    a.bytes()
        .rev()
        .zip(b.bytes().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

/// Prize tier won by a ticket suffix, if any.
///
/// Exact matches are checked highest tier first; otherwise the best partial
/// match against the first-prize numbers decides.
pub fn match_ticket(ticket_suffix: &str, record: &PrizeDrawRecord) -> DomainResult<Option<PrizeTier>> {
    if record.special_number == ticket_suffix {
        return Ok(Some(PrizeTier::Special));
    }
    if record.grand_number == ticket_suffix {
        return Ok(Some(PrizeTier::Grand));
    }
    if record.first_numbers.iter().any(|n| n == ticket_suffix) {
        return Ok(Some(PrizeTier::First));
    }

    let best = record
        .first_numbers
        .iter()
        .map(|n| common_suffix_len(n, ticket_suffix))
        .max()
        .unwrap_or(0);

    PrizeTier::from_common_suffix(best)
}

/// Winners among `invoices`, in input order.
pub fn find_winners(invoices: &[Invoice], record: &PrizeDrawRecord) -> DomainResult<Vec<WinningInvoice>> {
    let mut winners = Vec::new();
    for invoice in invoices {
        if let Some(tier) = match_ticket(invoice.number_suffix(), record)? {
            winners.push(WinningInvoice {
                tier,
                invoice: invoice.clone(),
            });
        }
    }
    Ok(winners)
}

/// Sum of prize money over a set of winners.
pub fn total_prize(winners: &[WinningInvoice]) -> u64 {
    winners.iter().map(|w| w.tier.amount()).sum()
}
