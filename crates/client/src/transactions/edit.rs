use api_types::{
    Money,
    transaction::{Action, Category, Transaction, TransactionUpdate},
};
use chrono::{NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{Error, Result};

/// Fields to change on one transaction. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditPatch {
    pub action: Option<Action>,
    pub amount: Option<Money>,
    pub description: Option<String>,
    pub vendor: Option<String>,
    pub customer: Option<String>,
    pub category: Option<Category>,
    pub terms: Option<String>,
    /// Moves the transaction to this local day, keeping its time of day.
    pub date: Option<NaiveDate>,
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl EditPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.amount.is_some_and(Money::is_negative) {
            return Err(Error::InvalidInput(
                "amount must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// The record as it looks after the patch.
    pub fn apply(&self, tx: &Transaction, tz: Tz) -> Transaction {
        let mut next = tx.clone();
        if let Some(action) = self.action {
            next.action = action;
        }
        if let Some(amount) = self.amount {
            next.amount = amount;
        }
        if let Some(description) = &self.description {
            next.description = description.trim().to_string();
        }
        if let Some(vendor) = &self.vendor {
            next.vendor = non_empty(vendor);
        }
        if let Some(customer) = &self.customer {
            next.customer = non_empty(customer);
        }
        if let Some(category) = self.category {
            next.category = Some(category);
        }
        if let Some(terms) = &self.terms {
            next.terms = non_empty(terms);
        }
        if let Some(date) = self.date {
            let time = tx.timestamp.with_timezone(&tz).time();
            if let Some(moved) = tz.from_local_datetime(&date.and_time(time)).earliest() {
                next.timestamp = moved.with_timezone(&Utc);
            }
        }
        next
    }

    /// Request body for the server; `date` is the edited record's local day.
    pub fn to_update(&self, edited: &Transaction, tz: Tz) -> TransactionUpdate {
        TransactionUpdate {
            action: self.action,
            amount: self.amount,
            description: self.description.clone(),
            vendor: self.vendor.clone(),
            customer: self.customer.clone(),
            category: self.category,
            terms: self.terms.clone(),
            date: edited
                .timestamp
                .with_timezone(&tz)
                .date_naive()
                .format("%Y-%m-%d")
                .to_string(),
        }
    }
}

/// An edit form opened on one record, optionally carrying a suggested
/// category the user has not accepted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct EditForm {
    pub original: Transaction,
    pub patch: EditPatch,
    pub suggested: Option<Category>,
}

impl EditForm {
    pub fn for_record(tx: &Transaction, tz: Tz) -> Self {
        Self {
            original: tx.clone(),
            patch: EditPatch {
                action: Some(tx.action),
                amount: Some(tx.amount),
                description: Some(tx.description.clone()),
                vendor: tx.vendor.clone(),
                customer: tx.customer.clone(),
                category: tx.category,
                terms: tx.terms.clone(),
                date: Some(tx.timestamp.with_timezone(&tz).date_naive()),
            },
            suggested: None,
        }
    }

    /// Pre-fills the category field with `category`.
    pub fn with_suggestion(mut self, category: Category) -> Self {
        self.patch.category = Some(category);
        self.suggested = Some(category);
        self
    }

    pub fn id(&self) -> &str {
        &self.original.id
    }
}
