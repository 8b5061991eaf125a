//! Two-month filing periods (Jan–Feb, Mar–Apr, …, Nov–Dec).

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use receipts_core::{DomainError, DomainResult};

/// A calendar month; the granularity at which invoice views are cached.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> DomainResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(DomainError::validation(format!(
                "month must be 1..=12, got {month}"
            )));
        }
        Ok(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The filing period this month belongs to.
    pub fn period(&self) -> InvoicePeriod {
        InvoicePeriod::normalized(self.year, self.month)
    }
}

impl core::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}-{}", self.year, self.month)
    }
}

/// A two-month filing window. `first_month` is always odd.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InvoicePeriod {
    year: i32,
    first_month: u32,
}

impl InvoicePeriod {
    /// Period containing `month` of `year`; any month of the window is accepted.
    pub fn new(year: i32, month: u32) -> DomainResult<Self> {
        MonthKey::new(year, month).map(|key| key.period())
    }

    fn normalized(year: i32, month: u32) -> Self {
        let first_month = if month % 2 == 0 { month - 1 } else { month };
        Self { year, first_month }
    }

    /// Period containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        MonthKey::of(date).period()
    }

    /// Period containing today (local clock).
    pub fn current() -> Self {
        Self::containing(Local::now().date_naive())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn first_month(&self) -> u32 {
        self.first_month
    }

    pub fn second_month(&self) -> u32 {
        self.first_month + 1
    }

    /// The two months before this period.
    ///
    /// Saturates: the earliest representable period is its own predecessor.
    pub fn predecessor(&self) -> Self {
        if self.first_month > 1 {
            return Self {
                year: self.year,
                first_month: self.first_month - 2,
            };
        }
        match self.year.checked_sub(1) {
            Some(year) => Self {
                year,
                first_month: 11,
            },
            None => *self,
        }
    }

    /// The two months after this period.
    ///
    /// Saturates: the latest representable period is its own successor.
    pub fn successor(&self) -> Self {
        if self.first_month < 11 {
            return Self {
                year: self.year,
                first_month: self.first_month + 2,
            };
        }
        match self.year.checked_add(1) {
            Some(year) => Self {
                year,
                first_month: 1,
            },
            None => *self,
        }
    }

    pub fn months(&self) -> [MonthKey; 2] {
        [
            MonthKey {
                year: self.year,
                month: self.first_month,
            },
            MonthKey {
                year: self.year,
                month: self.second_month(),
            },
        ]
    }

    pub fn contains(&self, key: MonthKey) -> bool {
        key.period() == *self
    }

    /// This period followed by every earlier one, newest first.
    pub fn history(self) -> impl Iterator<Item = InvoicePeriod> {
        core::iter::successors(Some(self), |p| {
            let earlier = p.predecessor();
            (earlier != *p).then_some(earlier)
        })
    }
}

impl core::fmt::Display for InvoicePeriod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}-{}", self.year, self.first_month, self.second_month())
    }
}
