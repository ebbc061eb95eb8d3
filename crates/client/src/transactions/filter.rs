//! Pure filtering, sorting and aggregation over loaded transactions.

use std::{cmp::Ordering, collections::HashMap};

use api_types::{
    Money,
    transaction::{Action, Transaction},
};
use chrono::NaiveDate;
use chrono_tz::Tz;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Tab {
    #[default]
    All,
    Purchase,
    Sale,
    Income,
}

/// Display record for a tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabLabel {
    pub id: Tab,
    pub icon: &'static str,
    pub text: &'static str,
}

impl Tab {
    pub const ALL: [Tab; 4] = [Tab::All, Tab::Purchase, Tab::Sale, Tab::Income];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Purchase => "purchase",
            Self::Sale => "sale",
            Self::Income => "income",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|tab| tab.as_str() == raw)
    }

    pub fn label(self) -> TabLabel {
        let (icon, text) = match self {
            Self::All => ("list", "All"),
            Self::Purchase => ("shopping-cart", "Purchases"),
            Self::Sale => ("trending-up", "Sales"),
            Self::Income => ("wallet", "Income"),
        };
        TabLabel {
            id: self,
            icon,
            text,
        }
    }

    /// Action the tab pins, if any.
    pub fn action(self) -> Option<Action> {
        match self {
            Self::All => None,
            Self::Purchase => Some(Action::Purchase),
            Self::Sale => Some(Action::Sale),
            Self::Income => Some(Action::Income),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    Timestamp,
    Amount,
}

impl SortKey {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "timestamp" | "date" => Some(Self::Timestamp),
            "amount" => Some(Self::Amount),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    #[default]
    Desc,
}

impl SortDir {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sort {
    pub key: SortKey,
    pub dir: SortDir,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    /// Inclusive, calendar day in the configured timezone.
    pub date_from: Option<NaiveDate>,
    /// Inclusive, calendar day in the configured timezone.
    pub date_to: Option<NaiveDate>,
    /// Empty means any action.
    pub actions: Vec<Action>,
    pub search: Option<String>,
}

/// Partial filter update. `None` leaves a field alone; `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPatch {
    pub date_from: Option<Option<NaiveDate>>,
    pub date_to: Option<Option<NaiveDate>>,
    pub actions: Option<Vec<Action>>,
    pub search: Option<Option<String>>,
}

impl Filter {
    pub fn apply_patch(&mut self, patch: FilterPatch) {
        if let Some(date_from) = patch.date_from {
            self.date_from = date_from;
        }
        if let Some(date_to) = patch.date_to {
            self.date_to = date_to;
        }
        if let Some(actions) = patch.actions {
            self.actions = actions;
        }
        if let Some(search) = patch.search {
            self.search = search.filter(|s| !s.trim().is_empty());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    pub filter: Filter,
    pub tab: Tab,
    pub sort: Sort,
}

impl ViewState {
    pub fn matches(&self, tx: &Transaction, tz: Tz) -> bool {
        if let Some(action) = self.tab.action()
            && tx.action != action
        {
            return false;
        }
        if !self.filter.actions.is_empty() && !self.filter.actions.contains(&tx.action) {
            return false;
        }

        let day = tx.timestamp.with_timezone(&tz).date_naive();
        if self.filter.date_from.is_some_and(|from| day < from) {
            return false;
        }
        if self.filter.date_to.is_some_and(|to| day > to) {
            return false;
        }

        match self.filter.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                tx.description.to_lowercase().contains(&needle)
                    || tx
                        .vendor
                        .as_deref()
                        .is_some_and(|vendor| vendor.to_lowercase().contains(&needle))
            }
            _ => true,
        }
    }

    pub fn compare(&self, a: &Transaction, b: &Transaction) -> Ordering {
        let by_key = match self.sort.key {
            SortKey::Timestamp => a.timestamp.cmp(&b.timestamp),
            SortKey::Amount => a.amount.cmp(&b.amount),
        };
        let by_key = match self.sort.dir {
            SortDir::Asc => by_key,
            SortDir::Desc => by_key.reverse(),
        };
        by_key.then_with(|| a.id.cmp(&b.id))
    }

    /// Filtered and sorted copy. Items are taken in page order, so for a
    /// duplicate id the copy from the latest page wins.
    pub fn apply<'a>(
        &self,
        items: impl IntoIterator<Item = &'a Transaction>,
        tz: Tz,
    ) -> Vec<Transaction> {
        let mut latest: HashMap<&'a str, &'a Transaction> = HashMap::new();
        for tx in items {
            latest.insert(tx.id.as_str(), tx);
        }
        let mut rows: Vec<Transaction> = latest
            .into_values()
            .filter(|tx| self.matches(tx, tz))
            .cloned()
            .collect();
        rows.sort_by(|a, b| self.compare(a, b));
        rows
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub count: usize,
    pub inflow: Money,
    pub outflow: Money,
    pub net: Money,
}

impl Summary {
    pub fn of<'a>(rows: impl IntoIterator<Item = &'a Transaction>) -> Self {
        let mut summary = Self::default();
        for tx in rows {
            summary.count += 1;
            if tx.action.is_inflow() {
                summary.inflow = summary.inflow.saturating_add(tx.amount);
            } else {
                summary.outflow = summary.outflow.saturating_add(tx.amount);
            }
        }
        summary.net = summary.inflow.saturating_sub(summary.outflow);
        summary
    }
}
