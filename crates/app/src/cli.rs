use std::path::PathBuf;

use api_types::{
    Money,
    export::DownloadScope,
    transaction::{Action, Category},
};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use client::{
    Settings,
    transactions::{SortDir, SortKey, Tab},
};

#[derive(Parser, Debug)]
#[command(name = "alirantunai")]
#[command(about = "AliranTunai cash-flow dashboard from the terminal")]
pub struct Cli {
    /// Optional config file path (TOML).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Override build mode (`development` or `production`).
    #[arg(long, global = true)]
    pub build_mode: Option<String>,
    /// Override the API origin for the selected build mode.
    #[arg(long, global = true, env = "ALIRANTUNAI_API_URL")]
    pub api_url: Option<String>,
    /// Override the session state file.
    #[arg(long, global = true)]
    pub state: Option<String>,
    /// Override the log level (e.g. `debug`).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Command-line values win over the file and the environment.
    pub fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(build_mode) = &self.build_mode {
            settings.app.build_mode = Some(build_mode.clone());
        }
        if let Some(api_url) = &self.api_url {
            settings.api.dev_origin = api_url.clone();
            settings.api.production_url = api_url.clone();
        }
        if let Some(state) = &self.state {
            settings.app.state_path = state.clone();
        }
        if let Some(level) = &self.log_level {
            settings.app.log_level = level.clone();
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log in with a phone number and a one-time code.
    Login(LoginArgs),
    /// End the session on this machine.
    Logout,
    /// Show who is logged in.
    Status,
    /// Cash-flow metrics and recent activity.
    Dashboard(DashboardArgs),
    /// List transactions.
    Transactions(FilterArgs),
    /// Change fields of one transaction.
    Edit(EditArgs),
    /// Delete one transaction.
    Delete(RecordArgs),
    /// Suggest a category for one transaction.
    Categorize(RecordArgs),
    /// Download transactions.
    Export(Export),
    /// Show or switch the operating mode.
    Mode(ModeArgs),
    /// Print the resolved configuration.
    Config,
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Phone number; asked for when missing.
    #[arg(long)]
    pub phone: Option<String>,
}

#[derive(Args, Debug)]
pub struct DashboardArgs {
    /// How many recent transactions to show.
    #[arg(long, default_value_t = client::dashboard::DEFAULT_RECENT)]
    pub recent: usize,
}

#[derive(Args, Debug, Clone)]
pub struct FilterArgs {
    /// First day to include (YYYY-MM-DD).
    #[arg(long)]
    pub from: Option<NaiveDate>,
    /// Last day to include (YYYY-MM-DD).
    #[arg(long)]
    pub to: Option<NaiveDate>,
    /// all, purchase, sale or income.
    #[arg(long, value_parser = parse_tab, default_value = "all")]
    pub tab: Tab,
    /// Restrict to these actions; repeatable.
    #[arg(long = "type", value_parser = parse_action)]
    pub actions: Vec<Action>,
    /// Case-insensitive text in description or vendor.
    #[arg(long)]
    pub search: Option<String>,
    /// timestamp or amount.
    #[arg(long, value_parser = parse_sort_key, default_value = "timestamp")]
    pub sort: SortKey,
    /// asc or desc.
    #[arg(long, value_parser = parse_sort_dir, default_value = "desc")]
    pub dir: SortDir,
    /// Server pages to load.
    #[arg(long, default_value_t = 1)]
    pub pages: usize,
}

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Transaction id.
    pub id: String,
}

#[derive(Args, Debug)]
pub struct EditArgs {
    /// Transaction id.
    pub id: String,
    #[arg(long = "type", value_parser = parse_action)]
    pub action: Option<Action>,
    /// Amount in ringgit, e.g. 12.50.
    #[arg(long)]
    pub amount: Option<Money>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub vendor: Option<String>,
    #[arg(long)]
    pub customer: Option<String>,
    #[arg(long, value_parser = parse_category)]
    pub category: Option<Category>,
    /// Payment method.
    #[arg(long)]
    pub terms: Option<String>,
    /// New day (YYYY-MM-DD); the time of day is kept.
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub struct Export {
    #[command(subcommand)]
    pub command: ExportCommand,
}

#[derive(Subcommand, Debug)]
pub enum ExportCommand {
    /// Write the filtered transactions to a CSV file.
    Csv(FilterArgs),
    /// Download the server-generated workbook.
    Excel(ExcelArgs),
}

#[derive(Args, Debug)]
pub struct ExcelArgs {
    /// all, purchase or sale.
    #[arg(long, value_parser = parse_scope, default_value = "all")]
    pub scope: DownloadScope,
}

#[derive(Args, Debug)]
pub struct ModeArgs {
    /// personal or business; omit to show the current mode.
    pub mode: Option<String>,
}

fn parse_tab(raw: &str) -> Result<Tab, String> {
    Tab::parse(raw).ok_or_else(|| format!("unknown tab: {raw}"))
}

fn parse_action(raw: &str) -> Result<Action, String> {
    Action::parse(raw).ok_or_else(|| format!("unknown transaction type: {raw}"))
}

fn parse_category(raw: &str) -> Result<Category, String> {
    Category::parse(raw).ok_or_else(|| format!("unknown category: {raw}"))
}

fn parse_sort_key(raw: &str) -> Result<SortKey, String> {
    SortKey::parse(raw).ok_or_else(|| format!("unknown sort key: {raw}"))
}

fn parse_sort_dir(raw: &str) -> Result<SortDir, String> {
    SortDir::parse(raw).ok_or_else(|| format!("unknown sort direction: {raw}"))
}

fn parse_scope(raw: &str) -> Result<DownloadScope, String> {
    DownloadScope::parse(raw).ok_or_else(|| format!("unknown export scope: {raw}"))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn filters_parse() {
        let cli = Cli::parse_from([
            "alirantunai",
            "transactions",
            "--from",
            "2025-01-10",
            "--to",
            "2025-01-20",
            "--tab",
            "purchase",
            "--type",
            "purchase",
            "--sort",
            "amount",
            "--dir",
            "asc",
        ]);
        let Command::Transactions(args) = cli.command else {
            panic!("expected transactions");
        };
        assert_eq!(args.tab, Tab::Purchase);
        assert_eq!(args.actions, vec![Action::Purchase]);
        assert_eq!(args.sort, SortKey::Amount);
        assert_eq!(args.dir, SortDir::Asc);
        assert_eq!(args.from, NaiveDate::from_ymd_opt(2025, 1, 10));
        assert_eq!(args.pages, 1);
    }

    #[test]
    fn overrides_apply() {
        let cli = Cli::parse_from([
            "alirantunai",
            "--api-url",
            "http://127.0.0.1:4000",
            "--build-mode",
            "production",
            "status",
        ]);
        let mut settings = Settings::default();
        cli.apply_overrides(&mut settings);
        assert_eq!(settings.api.production_url, "http://127.0.0.1:4000");
        assert_eq!(settings.app.build_mode.as_deref(), Some("production"));
    }
}
