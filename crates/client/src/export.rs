//! Downloads: server-generated workbooks and CSV built from the current view.

use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use api_types::{export::DownloadScope, transaction::Transaction};
use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use csv::{QuoteStyle, WriterBuilder};
use serde::Serialize;

use crate::{
    config::{Feature, FeatureFlags},
    error::{Error, Result},
    http::ApiClient,
};

pub const CSV_HEADERS: [&str; 6] = [
    "Date",
    "Type",
    "Description",
    "Vendor/Customer",
    "Amount",
    "Category",
];

const MAX_SUFFIX: u32 = 1000;

/// Where finished downloads go.
pub trait SaveSink: Send + Sync {
    /// Stores `bytes` under a name derived from `filename` and returns where
    /// it ended up.
    fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf>;
}

/// Saves into a directory. Existing files are never replaced: a clashing
/// name gets a ` (n)` suffix before the extension.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn candidate(&self, filename: &str, n: u32) -> PathBuf {
        if n == 0 {
            return self.dir.join(filename);
        }
        let path = Path::new(filename);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_string());
        match path.extension() {
            Some(ext) => self
                .dir
                .join(format!("{stem} ({n}).{}", ext.to_string_lossy())),
            None => self.dir.join(format!("{stem} ({n})")),
        }
    }
}

impl SaveSink for DirectorySink {
    fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let name = Path::new(filename)
            .file_name()
            .ok_or_else(|| Error::InvalidInput(format!("invalid file name `{filename}`")))?
            .to_string_lossy()
            .into_owned();
        fs::create_dir_all(&self.dir)?;

        for n in 0..MAX_SUFFIX {
            let path = self.candidate(&name, n);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(bytes)?;
                    file.flush()?;
                    return Ok(path);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(Error::InvalidInput(format!(
            "too many files named like `{name}` in {}",
            self.dir.display()
        )))
    }
}

/// Keeps saved files in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    saved: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> Vec<(String, Vec<u8>)> {
        self.saved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl SaveSink for MemorySink {
    fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        self.saved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((filename.to_string(), bytes.to_vec()));
        Ok(PathBuf::from(filename))
    }
}

pub fn excel_filename(scope: DownloadScope, wa_id: &str, now: DateTime<Tz>) -> String {
    format!("alirantunai-{}-{wa_id}-{}.xlsx", scope.as_str(), now.year())
}

pub fn csv_filename(now: DateTime<Tz>) -> String {
    format!("transactions-{}.csv", now.format("%Y%m%d-%H%M%S"))
}

#[derive(Serialize)]
struct CsvRow<'a> {
    date: String,
    kind: &'static str,
    description: &'a str,
    counterparty: &'a str,
    amount: String,
    category: &'static str,
}

/// Renders `rows` in the given order. Every field is quoted.
pub fn transactions_csv(rows: &[Transaction], tz: Tz) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .has_headers(false)
        .from_writer(vec![]);
    writer.write_record(CSV_HEADERS)?;
    for tx in rows {
        writer.serialize(CsvRow {
            date: tx
                .timestamp
                .with_timezone(&tz)
                .format("%Y-%m-%d")
                .to_string(),
            kind: tx.action.label(),
            description: &tx.description,
            counterparty: tx.counterparty().unwrap_or(""),
            amount: tx.amount.to_decimal_string(),
            category: tx.category.map_or("", |category| category.as_str()),
        })?;
    }
    writer
        .into_inner()
        .map_err(|err| Error::Io(err.into_error()))
}

/// Runs both download paths and hands the results to a [`SaveSink`].
#[derive(Clone)]
pub struct Exporter {
    api: ApiClient,
    sink: Arc<dyn SaveSink>,
    tz: Tz,
    features: FeatureFlags,
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter").field("tz", &self.tz).finish()
    }
}

impl Exporter {
    pub fn new(api: ApiClient, sink: Arc<dyn SaveSink>, tz: Tz, features: FeatureFlags) -> Self {
        Self {
            api,
            sink,
            tz,
            features,
        }
    }

    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }

    /// Downloads the server workbook for `scope` and saves it.
    pub async fn excel(&self, wa_id: &str, scope: DownloadScope) -> Result<PathBuf> {
        self.features.require(Feature::BusinessExcelExport)?;
        let bytes = self.api.download_excel(wa_id, scope).await.map_err(|err| {
            tracing::error!("excel export for {wa_id} failed: {err}");
            err
        })?;
        let filename = excel_filename(scope, wa_id, self.now());
        let path = self.sink.save(&filename, &bytes)?;
        tracing::info!("saved {} bytes to {}", bytes.len(), path.display());
        Ok(path)
    }

    /// Saves `rows` (normally the current filtered view) as CSV.
    pub fn csv(&self, rows: &[Transaction]) -> Result<PathBuf> {
        let bytes = transactions_csv(rows, self.tz)?;
        let path = self.sink.save(&csv_filename(self.now()), &bytes)?;
        tracing::info!("exported {} transactions to {}", rows.len(), path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use api_types::{
        Money,
        transaction::{Action, Category},
    };
    use chrono::TimeZone;

    use super::*;

    fn row(id: &str, description: &str, vendor: Option<&str>) -> Transaction {
        Transaction {
            id: id.to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 10, 18, 0, 0).unwrap(),
            action: Action::Purchase,
            amount: Money::new(12_345),
            description: description.to_string(),
            vendor: vendor.map(str::to_string),
            customer: None,
            category: Some(Category::Cogs),
            terms: None,
        }
    }

    #[test]
    fn every_field_is_quoted() {
        let csv = transactions_csv(&[row("a", "Flour", Some("Kedai"))], chrono_tz::UTC).unwrap();
        let text = String::from_utf8(csv).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some(r#""Date","Type","Description","Vendor/Customer","Amount","Category""#)
        );
        assert_eq!(
            lines.next(),
            Some(r#""2025-01-10","Purchase","Flour","Kedai","123.45","COGS""#)
        );
    }

    #[test]
    fn dates_use_local_day() {
        let csv = transactions_csv(&[row("a", "x", None)], chrono_tz::Asia::Kuala_Lumpur).unwrap();
        assert!(String::from_utf8(csv).unwrap().contains(r#""2025-01-11""#));
    }

    #[test]
    fn awkward_fields_survive_a_strict_parser() {
        let nasty = "He said \"hi\", then\nleft";
        let csv = transactions_csv(&[row("a", nasty, Some("A, B & \"C\""))], chrono_tz::UTC)
            .unwrap();
        assert!(String::from_utf8_lossy(&csv).contains(r#""He said ""hi"", then"#));

        let mut reader = csv::ReaderBuilder::new().from_reader(csv.as_slice());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), CSV_HEADERS);
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[2], nasty);
        assert_eq!(&record[3], "A, B & \"C\"");
    }

    #[test]
    fn empty_view_still_has_headers() {
        let csv = transactions_csv(&[], chrono_tz::UTC).unwrap();
        assert_eq!(String::from_utf8(csv).unwrap().lines().count(), 1);
    }

    #[test]
    fn filenames() {
        let now = chrono_tz::Asia::Kuala_Lumpur
            .with_ymd_and_hms(2025, 3, 4, 5, 6, 7)
            .unwrap();
        assert_eq!(
            excel_filename(DownloadScope::Purchase, "60123456789", now),
            "alirantunai-purchase-60123456789-2025.xlsx"
        );
        assert_eq!(csv_filename(now), "transactions-20250304-050607.csv");
    }

    #[test]
    fn directory_sink_never_overwrites() {
        let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../target/test_state")
            .join(format!("downloads_{}", uuid::Uuid::new_v4()));
        let sink = DirectorySink::new(&dir);
        let first = sink.save("report.csv", b"one").unwrap();
        let second = sink.save("report.csv", b"two").unwrap();
        assert_eq!(first, dir.join("report.csv"));
        assert_eq!(second, dir.join("report (1).csv"));
        assert_eq!(fs::read(&first).unwrap(), b"one");
        let _ = fs::remove_dir_all(dir);
    }
}
