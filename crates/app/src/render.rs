//! Plain-text output for the terminal.

use api_types::{dashboard::DashboardSummary, transaction::Transaction};
use chrono_tz::Tz;
use client::{
    ApiError, ClientConfig, Error,
    config::Feature,
    transactions::{EditForm, Summary, TransactionList},
};

pub fn transaction_line(tx: &Transaction, tz: Tz) -> String {
    let mut line = format!(
        "{}  {:<9} {:>12}  {}",
        tx.timestamp.with_timezone(&tz).format("%Y-%m-%d %H:%M"),
        tx.action.label(),
        tx.amount.to_decimal_string(),
        tx.description,
    );
    if let Some(counterparty) = tx.counterparty() {
        line.push_str(&format!(" @ {counterparty}"));
    }
    if let Some(category) = tx.category {
        line.push_str(&format!(" [{}]", category.as_str()));
    }
    line.push_str(&format!("  ({})", tx.id));
    line
}

/// `metrics` adds the cash conversion cycle line.
pub fn dashboard(
    summary: &DashboardSummary,
    recent: &[Transaction],
    tz: Tz,
    metrics: bool,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("Transactions        {}\n", summary.total_transactions));
    out.push_str(&format!("Sales               {}\n", summary.total_sales));
    out.push_str(&format!("Purchases           {}\n", summary.total_purchases));
    out.push_str(&format!(
        "Payments received   {}\n",
        summary.total_payments_received
    ));
    out.push_str(&format!("Payments made       {}\n", summary.total_payments_made));
    if metrics {
        out.push_str(&format!(
            "Cash conversion     {} days (DSO {} + DIO {} - DPO {})\n",
            summary.ccc, summary.dso, summary.dio, summary.dpo
        ));
    }
    if recent.is_empty() {
        out.push_str("\nNo transactions yet.\n");
    } else {
        out.push_str("\nRecent\n");
        for tx in recent {
            out.push_str(&transaction_line(tx, tz));
            out.push('\n');
        }
    }
    out
}

pub fn transactions(list: &TransactionList, summary: &Summary, tz: Tz) -> String {
    let mut out = String::new();
    if list.rows.is_empty() {
        out.push_str("No transactions match.\n");
    }
    for tx in &list.rows {
        out.push_str(&transaction_line(tx, tz));
        out.push('\n');
    }
    if list.truncated {
        out.push_str(&format!(
            "... showing {} of {}\n",
            list.rows.len(),
            list.total
        ));
    }
    out.push_str(&format!(
        "{} shown, in {} out {} net {}\n",
        summary.count, summary.inflow, summary.outflow, summary.net
    ));
    out
}

pub fn suggestion(form: &EditForm) -> String {
    let current = form
        .original
        .category
        .map_or("none", |category| category.as_str());
    match form.suggested {
        Some(category) => format!(
            "Suggested category for {}: {} (currently {current})\nApply with: alirantunai edit {} --category {}",
            form.id(),
            category.as_str(),
            form.id(),
            category.as_str(),
        ),
        None => format!("No suggestion for {} (currently {current})", form.id()),
    }
}

pub fn config(config: &ClientConfig) -> String {
    let mut out = String::new();
    out.push_str(&format!("build mode   {:?}\n", config.build_mode));
    out.push_str(&format!("api          {}\n", config.api_base));
    out.push_str(&format!("timezone     {}\n", config.timezone));
    out.push_str(&format!("state        {}\n", config.state_path.display()));
    out.push_str(&format!("downloads    {}\n", config.download_dir.display()));

    let head = config.brand.head();
    out.push_str("\n[head]\n");
    out.push_str(&format!("title        {}\n", head.title));
    out.push_str(&format!("favicon      {}\n", head.favicon));
    out.push_str(&format!("description  {}\n", head.description));
    out.push_str(&format!("keywords     {}\n", head.keywords));

    out.push_str("\n[theme]\n");
    for (name, value) in config.brand.css_custom_properties() {
        out.push_str(&format!("{name}: {value};\n"));
    }

    out.push_str("\n[features]\n");
    out.push_str(&format!(
        "default_mode {}\n",
        config.features.default_mode().as_str()
    ));
    for feature in Feature::ALL {
        let state = if config.features.is_feature_enabled(feature) {
            "on"
        } else {
            "off"
        };
        out.push_str(&format!("{:<30} {state}\n", feature.as_str()));
    }
    out
}

/// One line for the user; details go to the log.
pub fn error_line(err: &Error) -> String {
    match err {
        Error::Api(ApiError::AuthExpired) => {
            "Your session has expired. Run `alirantunai login`.".to_string()
        }
        Error::Api(ApiError::Transport(_)) => {
            "Unable to reach the server. Check your connection and try again.".to_string()
        }
        Error::Api(ApiError::Malformed(_)) => "The server sent an unexpected response.".to_string(),
        Error::Api(ApiError::Server { status, .. }) => {
            format!("The server failed ({status}). Please try again later.")
        }
        Error::Api(other) => other.message(),
        Error::Unauthenticated => "Not logged in. Run `alirantunai login`.".to_string(),
        other => other.to_string(),
    }
}
