//! Wire contract between the AliranTunai dashboard client and the backend.
//!
//! Every type in here mirrors a JSON body exchanged with the HTTP API. Field
//! names follow the server (a mix of `snake_case` and `camelCase`), while the
//! Rust side always uses `snake_case`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod money;
mod timestamp;

pub use money::{Money, MoneyError};

pub mod identity {
    use super::*;

    /// Operating context selected by the user.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum Mode {
        #[default]
        Personal,
        Business,
    }

    impl Mode {
        pub const ALL: [Mode; 2] = [Mode::Personal, Mode::Business];

        pub fn as_str(self) -> &'static str {
            match self {
                Self::Personal => "personal",
                Self::Business => "business",
            }
        }

        pub fn parse(raw: &str) -> Option<Self> {
            match raw.trim().to_ascii_lowercase().as_str() {
                "personal" => Some(Self::Personal),
                "business" => Some(Self::Business),
                _ => None,
            }
        }
    }

    /// Account principal, keyed by the country-prefixed messaging account id.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Identity {
        pub wa_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub owner_name: Option<String>,
        #[serde(default)]
        pub mode: Mode,
    }

    impl Identity {
        /// Name to show in the UI, falling back to the account id.
        pub fn display_name(&self) -> &str {
            self.name
                .as_deref()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or(&self.wa_id)
        }
    }
}

pub mod auth {
    use super::identity::Identity;
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct SendOtp {
        pub phone_number: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct VerifyOtp {
        pub phone_number: String,
        pub otp: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct VerifyOtpResponse {
        pub token: String,
        pub user: Identity,
    }
}

/// Error body returned by the server on any non-2xx response.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: String,
    /// Set by `send-otp` when the user must message the bot before an OTP
    /// can be delivered.
    #[serde(
        default,
        rename = "requiresWhatsAppMessage",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub requires_whatsapp_message: bool,
}

pub mod transaction {
    use super::*;

    /// What happened, from the account holder's point of view.
    ///
    /// The sign of a transaction is carried here: amounts on the wire are
    /// always non-negative.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum Action {
        Sale,
        Purchase,
        Expense,
        PaymentReceived,
        PaymentMade,
        Income,
    }

    impl Action {
        pub const ALL: [Action; 6] = [
            Action::Sale,
            Action::Purchase,
            Action::Expense,
            Action::PaymentReceived,
            Action::PaymentMade,
            Action::Income,
        ];

        pub fn as_str(self) -> &'static str {
            match self {
                Self::Sale => "sale",
                Self::Purchase => "purchase",
                Self::Expense => "expense",
                Self::PaymentReceived => "payment_received",
                Self::PaymentMade => "payment_made",
                Self::Income => "income",
            }
        }

        pub fn label(self) -> &'static str {
            match self {
                Self::Sale => "Sale",
                Self::Purchase => "Purchase",
                Self::Expense => "Expense",
                Self::PaymentReceived => "Payment Received",
                Self::PaymentMade => "Payment Made",
                Self::Income => "Income",
            }
        }

        /// Money coming into the account.
        pub fn is_inflow(self) -> bool {
            matches!(self, Self::Sale | Self::PaymentReceived | Self::Income)
        }

        /// Money leaving the account.
        pub fn is_outflow(self) -> bool {
            !self.is_inflow()
        }

        pub fn parse(raw: &str) -> Option<Self> {
            let raw = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
            Self::ALL.into_iter().find(|action| action.as_str() == raw)
        }
    }

    /// Purchase-side category. Unknown values coming from the server fold
    /// into [`Category::Other`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "UPPERCASE")]
    pub enum Category {
        Opex,
        Capex,
        Cogs,
        Inventory,
        Marketing,
        Utilities,
        #[serde(other)]
        Other,
    }

    impl Category {
        pub const ALL: [Category; 7] = [
            Category::Opex,
            Category::Capex,
            Category::Cogs,
            Category::Inventory,
            Category::Marketing,
            Category::Utilities,
            Category::Other,
        ];

        pub fn as_str(self) -> &'static str {
            match self {
                Self::Opex => "OPEX",
                Self::Capex => "CAPEX",
                Self::Cogs => "COGS",
                Self::Inventory => "INVENTORY",
                Self::Marketing => "MARKETING",
                Self::Utilities => "UTILITIES",
                Self::Other => "OTHER",
            }
        }

        pub fn parse(raw: &str) -> Option<Self> {
            let raw = raw.trim().to_ascii_uppercase();
            Self::ALL.into_iter().find(|category| category.as_str() == raw)
        }
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct Transaction {
        /// Opaque id. Older payloads carry it as `_id`.
        #[serde(alias = "_id")]
        pub id: String,
        #[serde(with = "crate::timestamp")]
        pub timestamp: DateTime<Utc>,
        pub action: Action,
        pub amount: Money,
        #[serde(default)]
        pub description: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub vendor: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub customer: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub category: Option<Category>,
        /// Payment method.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub terms: Option<String>,
    }

    impl Transaction {
        /// Counterparty: the vendor on the purchase side, the customer otherwise.
        pub fn counterparty(&self) -> Option<&str> {
            self.vendor
                .as_deref()
                .filter(|v| !v.is_empty())
                .or_else(|| self.customer.as_deref().filter(|c| !c.is_empty()))
        }
    }

    #[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Pagination {
        pub current_page: u32,
        pub has_more: bool,
        #[serde(default)]
        pub total_count: u64,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct TransactionPage {
        pub transactions: Vec<Transaction>,
        pub pagination: Pagination,
    }

    /// Body of `PUT /api/transactions/:id`: the changed fields plus the
    /// calendar `date` of the (possibly new) timestamp.
    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct TransactionUpdate {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub action: Option<Action>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub amount: Option<Money>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub description: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub vendor: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub customer: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub category: Option<Category>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub terms: Option<String>,
        /// `YYYY-MM-DD`.
        pub date: String,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct TransactionEnvelope {
        pub transaction: Transaction,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct CategorizeRequest {
        pub description: String,
        pub vendor: Option<String>,
        pub amount: Money,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct CategorizeResponse {
        pub category: Category,
    }
}

pub mod dashboard {
    use super::transaction::Transaction;
    use super::*;

    /// Server-derived cash-flow metrics for one account.
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct DashboardSummary {
        pub total_transactions: u64,
        /// Cash conversion cycle in days. May be negative.
        pub ccc: i64,
        pub dso: i64,
        pub dio: i64,
        pub dpo: i64,
        pub total_sales: Money,
        pub total_purchases: Money,
        pub total_payments_received: Money,
        pub total_payments_made: Money,
        #[serde(default)]
        pub recent_transactions: Vec<Transaction>,
    }

    impl DashboardSummary {
        /// `dso + dio - dpo`, or `None` when the inputs overflow.
        pub fn expected_ccc(&self) -> Option<i64> {
            self.dso.checked_add(self.dio)?.checked_sub(self.dpo)
        }

        /// `ccc = dso + dio - dpo`. Overflowing inputs are inconsistent.
        pub fn ccc_consistent(&self) -> bool {
            self.expected_ccc() == Some(self.ccc)
        }
    }
}

pub mod profile {
    use super::identity::{Identity, Mode};
    use super::*;

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct ProfileUpdate {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub owner_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub mode: Option<Mode>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ProfileResponse {
        pub user: Identity,
    }
}

pub mod export {
    /// Subset of transactions the server puts in a generated workbook.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub enum DownloadScope {
        #[default]
        All,
        Purchase,
        Sale,
    }

    impl DownloadScope {
        pub fn as_str(self) -> &'static str {
            match self {
                Self::All => "all",
                Self::Purchase => "purchase",
                Self::Sale => "sale",
            }
        }

        pub fn parse(raw: &str) -> Option<Self> {
            match raw.trim().to_ascii_lowercase().as_str() {
                "all" => Some(Self::All),
                "purchase" | "purchases" => Some(Self::Purchase),
                "sale" | "sales" => Some(Self::Sale),
                _ => None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::dashboard::DashboardSummary;
    use super::identity::{Identity, Mode};
    use super::transaction::{Action, Category, Transaction, TransactionPage};
    use super::*;

    #[test]
    fn transaction_accepts_legacy_id_field() {
        let tx: Transaction = serde_json::from_value(serde_json::json!({
            "_id": "abc",
            "timestamp": "2025-01-10T08:30:00.000Z",
            "action": "payment_received",
            "amount": 12.5,
            "description": "invoice 7"
        }))
        .unwrap();
        assert_eq!(tx.id, "abc");
        assert_eq!(tx.action, Action::PaymentReceived);
        assert_eq!(tx.amount.sen(), 1250);

        let out = serde_json::to_value(&tx).unwrap();
        assert_eq!(out["id"], "abc");
        assert!(out.get("_id").is_none());
    }

    #[test]
    fn unknown_category_folds_into_other() {
        let tx: Transaction = serde_json::from_value(serde_json::json!({
            "id": "1",
            "timestamp": "2025-01-10T08:30:00Z",
            "action": "purchase",
            "amount": "3.20",
            "category": "TRAVEL"
        }))
        .unwrap();
        assert_eq!(tx.category, Some(Category::Other));
        assert_eq!(tx.description, "");
    }

    #[test]
    fn identity_round_trips_minimal_payload() {
        let raw = serde_json::json!({"wa_id": "60123456789", "mode": "personal"});
        let identity: Identity = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(identity.mode, Mode::Personal);
        assert_eq!(identity.display_name(), "60123456789");
        assert_eq!(serde_json::to_value(&identity).unwrap(), raw);
    }

    #[test]
    fn dashboard_summary_keeps_negative_ccc() {
        let summary: DashboardSummary = serde_json::from_value(serde_json::json!({
            "totalTransactions": 3,
            "ccc": -12,
            "dso": 5,
            "dio": 3,
            "dpo": 20,
            "totalSales": 100,
            "totalPurchases": 40.25,
            "totalPaymentsReceived": 0,
            "totalPaymentsMade": 0
        }))
        .unwrap();
        assert_eq!(summary.ccc, -12);
        assert!(summary.ccc_consistent());
        assert!(summary.recent_transactions.is_empty());
    }

    #[test]
    fn overflowing_metrics_are_inconsistent() {
        let summary: DashboardSummary = serde_json::from_value(serde_json::json!({
            "totalTransactions": 0,
            "ccc": 0,
            "dso": i64::MAX,
            "dio": 1,
            "dpo": 0,
            "totalSales": 0,
            "totalPurchases": 0,
            "totalPaymentsReceived": 0,
            "totalPaymentsMade": 0
        }))
        .unwrap();
        assert_eq!(summary.expected_ccc(), None);
        assert!(!summary.ccc_consistent());
    }

    #[test]
    fn page_reads_camel_case_pagination() {
        let page: TransactionPage = serde_json::from_value(serde_json::json!({
            "transactions": [],
            "pagination": {"currentPage": 2, "hasMore": true, "totalCount": 41}
        }))
        .unwrap();
        assert_eq!(page.pagination.current_page, 2);
        assert!(page.pagination.has_more);
        assert_eq!(page.pagination.total_count, 41);
    }

    #[test]
    fn error_body_reads_precondition_flag() {
        let body: ErrorBody = serde_json::from_value(serde_json::json!({
            "error": "msg first",
            "requiresWhatsAppMessage": true
        }))
        .unwrap();
        assert!(body.requires_whatsapp_message);

        let plain: ErrorBody = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(!plain.requires_whatsapp_message);
        assert_eq!(plain.error, "");
    }

    #[test]
    fn action_parse_accepts_labels() {
        assert_eq!(Action::parse("Payment Made"), Some(Action::PaymentMade));
        assert_eq!(Action::parse("sale"), Some(Action::Sale));
        assert_eq!(Action::parse("refund"), None);
        assert!(Action::Income.is_inflow());
        assert!(Action::Expense.is_outflow());
    }
}
