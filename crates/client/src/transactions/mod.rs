//! Transaction list for one account.
//!
//! [`TransactionsView`] keeps the paged `["transactions", id]` cache entry
//! observed, derives the filtered and sorted view from it on demand, and runs
//! edit/delete with optimistic local updates. Mutations on the same record
//! queue behind each other; different records proceed independently.

mod edit;
mod filter;

use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard},
};

use api_types::transaction::{CategorizeRequest, Transaction};
use chrono::{TimeDelta, Utc};
use chrono_tz::Tz;

use crate::{
    cache::{Page, PagedData, QueryCache, QueryKey, QueryOptions, Subscription},
    config::{Feature, FeatureFlags},
    dashboard::dashboard_key,
    error::{ApiError, Result},
    http::ApiClient,
};

pub use edit::{EditForm, EditPatch};
pub use filter::{
    Filter, FilterPatch, Sort, SortDir, SortKey, Summary, Tab, TabLabel, ViewState,
};

pub const TRANSACTIONS_KEY: &str = "transactions";
pub const DEFAULT_PAGE_SIZE: u32 = 50;
/// Most rows [`TransactionsView::list`] hands out at once.
pub const LIST_CAP: usize = 500;

pub fn transactions_key(wa_id: &str) -> QueryKey {
    QueryKey::new([TRANSACTIONS_KEY, wa_id])
}

/// Rows ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionList {
    pub rows: Vec<Transaction>,
    /// Size of the whole filtered view.
    pub total: usize,
    pub truncated: bool,
}

type PageFuture =
    Pin<Box<dyn Future<Output = std::result::Result<Page<Transaction>, ApiError>> + Send>>;

fn page_loader(
    api: ApiClient,
    wa_id: String,
    limit: u32,
) -> impl Fn(u32) -> PageFuture + Send + Sync + 'static {
    move |number: u32| -> PageFuture {
        let api = api.clone();
        let wa_id = wa_id.clone();
        Box::pin(async move {
            let page = api.transactions(&wa_id, number, limit).await?;
            let horizon = Utc::now() + TimeDelta::minutes(5);
            for tx in page.transactions.iter().filter(|tx| tx.timestamp > horizon) {
                tracing::warn!(
                    "transaction {} is dated in the future ({})",
                    tx.id,
                    tx.timestamp
                );
            }
            Ok(Page {
                number,
                items: page.transactions,
                has_more: page.pagination.has_more,
                total_count: page.pagination.total_count,
            })
        })
    }
}

/// Where a removed record sat, so a rollback can put it back.
#[derive(Debug, Clone, Copy)]
struct Slot {
    page: usize,
    index: usize,
}

struct Inner {
    api: ApiClient,
    cache: QueryCache,
    wa_id: String,
    key: QueryKey,
    tz: Tz,
    features: FeatureFlags,
    page_size: u32,
    options: QueryOptions,
    state: Mutex<ViewState>,
    record_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    _subscription: Subscription<PagedData<Transaction>>,
}

#[derive(Clone)]
pub struct TransactionsView {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TransactionsView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionsView")
            .field("wa_id", &self.inner.wa_id)
            .field("state", &*self.state())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TransactionsView {
    /// Starts observing the account's transactions. Must be called inside a
    /// tokio runtime; the first page starts loading right away.
    pub fn new(
        api: ApiClient,
        cache: QueryCache,
        wa_id: &str,
        tz: Tz,
        features: FeatureFlags,
    ) -> Self {
        Self::with_page_size(api, cache, wa_id, tz, features, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(
        api: ApiClient,
        cache: QueryCache,
        wa_id: &str,
        tz: Tz,
        features: FeatureFlags,
        page_size: u32,
    ) -> Self {
        let key = transactions_key(wa_id);
        let options = QueryOptions::transactions();
        let subscription = cache.subscribe_pages(
            &key,
            options,
            page_loader(api.clone(), wa_id.to_string(), page_size),
        );
        Self {
            inner: Arc::new(Inner {
                api,
                cache,
                wa_id: wa_id.to_string(),
                key,
                tz,
                features,
                page_size,
                options,
                state: Mutex::new(ViewState::default()),
                record_locks: Mutex::new(HashMap::new()),
                _subscription: subscription,
            }),
        }
    }

    pub fn wa_id(&self) -> &str {
        &self.inner.wa_id
    }

    pub fn key(&self) -> &QueryKey {
        &self.inner.key
    }

    fn state(&self) -> MutexGuard<'_, ViewState> {
        lock(&self.inner.state)
    }

    fn pages(&self) -> Option<Arc<PagedData<Transaction>>> {
        self.inner.cache.data(&self.inner.key)
    }

    /// Waits for the first page (or returns what is cached).
    pub async fn load(&self) -> std::result::Result<(), ApiError> {
        let inner = &self.inner;
        inner
            .cache
            .infinite_query(
                &inner.key,
                inner.options,
                page_loader(inner.api.clone(), inner.wa_id.clone(), inner.page_size),
            )
            .await
            .map(|_| ())
    }

    /// Appends the next server page. Returns `false` when there is none.
    pub async fn load_more(&self) -> std::result::Result<bool, ApiError> {
        if self.pages().is_none() {
            self.load().await?;
        }
        self.inner.cache.fetch_next_page(&self.inner.key).await
    }

    /// Loads until `pages` pages are held or the server runs out.
    pub async fn load_pages(&self, pages: usize) -> std::result::Result<(), ApiError> {
        self.load().await?;
        while self.pages().is_some_and(|data| data.pages().len() < pages) {
            if !self.load_more().await? {
                break;
            }
        }
        Ok(())
    }

    pub fn has_more(&self) -> bool {
        self.pages().is_some_and(|data| data.has_more())
    }

    pub fn is_loading_next(&self) -> bool {
        self.inner
            .cache
            .state::<PagedData<Transaction>>(&self.inner.key)
            .loading_next
    }

    /// Last fetch failure, if the most recent load did not succeed.
    pub fn error(&self) -> Option<ApiError> {
        self.inner
            .cache
            .state::<PagedData<Transaction>>(&self.inner.key)
            .error
    }

    pub fn view_state(&self) -> ViewState {
        self.state().clone()
    }

    pub fn set_filter(&self, patch: FilterPatch) {
        self.state().filter.apply_patch(patch);
    }

    pub fn set_sort(&self, key: SortKey, dir: SortDir) {
        self.state().sort = Sort { key, dir };
    }

    pub fn set_tab(&self, tab: Tab) {
        self.state().tab = tab;
    }

    pub fn tabs() -> [TabLabel; 4] {
        Tab::ALL.map(Tab::label)
    }

    /// The whole filtered and sorted view.
    pub fn filtered(&self) -> Vec<Transaction> {
        let state = self.view_state();
        match self.pages() {
            Some(data) => state.apply(data.items(), self.inner.tz),
            None => Vec::new(),
        }
    }

    /// The filtered view, capped at [`LIST_CAP`] rows.
    pub fn list(&self) -> TransactionList {
        let mut rows = self.filtered();
        let total = rows.len();
        rows.truncate(LIST_CAP);
        TransactionList {
            truncated: total > rows.len(),
            rows,
            total,
        }
    }

    pub fn summary(&self) -> Summary {
        Summary::of(&self.filtered())
    }

    pub fn get(&self, id: &str) -> Option<Transaction> {
        self.pages()
            .and_then(|data| data.items().filter(|tx| tx.id == id).last().cloned())
    }

    /// Marks the account's transactions and dashboard stale.
    pub fn refresh(&self) {
        self.inner.cache.invalidate(&self.inner.key);
        self.inner.cache.invalidate(&dashboard_key(&self.inner.wa_id));
    }

    fn record_lock(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        lock(&self.inner.record_locks)
            .entry(id.to_string())
            .or_default()
            .clone()
    }

    fn release_record_lock(&self, id: &str, record: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = lock(&self.inner.record_locks);
        // The map and `record` are the only holders left.
        if Arc::strong_count(&record) <= 2 {
            locks.remove(id);
        }
    }

    fn not_found(id: &str) -> ApiError {
        ApiError::NotFound {
            message: format!("no such transaction: {id}"),
        }
    }

    fn replace_local(&self, id: &str, tx: &Transaction) {
        self.inner
            .cache
            .update_data::<PagedData<Transaction>, _>(&self.inner.key, |data| {
                let mut next = data.clone();
                for item in next
                    .pages_mut()
                    .iter_mut()
                    .flat_map(|page| page.items.iter_mut())
                    .filter(|item| item.id == id)
                {
                    *item = tx.clone();
                }
                next
            });
    }

    fn remove_local(&self, id: &str) -> Option<Slot> {
        let mut slot = None;
        self.inner
            .cache
            .update_data::<PagedData<Transaction>, _>(&self.inner.key, |data| {
                let mut next = data.clone();
                for (page_index, page) in next.pages_mut().iter_mut().enumerate() {
                    if let Some(index) = page.items.iter().position(|item| item.id == id) {
                        page.items.remove(index);
                        slot.get_or_insert(Slot {
                            page: page_index,
                            index,
                        });
                    }
                }
                next
            });
        slot
    }

    fn restore_local(&self, slot: Slot, tx: &Transaction) {
        self.inner
            .cache
            .update_data::<PagedData<Transaction>, _>(&self.inner.key, |data| {
                let mut next = data.clone();
                if next.items().any(|item| item.id == tx.id) {
                    return next;
                }
                let pages = next.pages_mut();
                let page_index = slot.page.min(pages.len().saturating_sub(1));
                if let Some(page) = pages.get_mut(page_index) {
                    let index = slot.index.min(page.items.len());
                    page.items.insert(index, tx.clone());
                }
                next
            });
    }

    /// Applies `patch` locally, then on the server. On failure the record
    /// is restored unless a server refetch replaced the list meanwhile; a
    /// 404 drops the record instead.
    pub async fn edit(&self, id: &str, patch: EditPatch) -> Result<Transaction> {
        self.inner
            .features
            .require(Feature::BusinessTransactionEditing)?;
        patch.validate()?;
        let record = self.record_lock(id);
        let result = {
            let _guard = record.lock().await;
            self.edit_locked(id, &patch).await
        };
        self.release_record_lock(id, record);
        result
    }

    async fn edit_locked(&self, id: &str, patch: &EditPatch) -> Result<Transaction> {
        let inner = &self.inner;
        let previous = self.get(id).ok_or_else(|| Self::not_found(id))?;
        let optimistic = patch.apply(&previous, inner.tz);
        let update = patch.to_update(&optimistic, inner.tz);

        let seen_epoch = inner.cache.server_epoch(&inner.key);
        self.replace_local(id, &optimistic);

        match inner.api.update_transaction(id, &update).await {
            Ok(saved) => {
                tracing::info!("updated transaction {id}");
                self.replace_local(id, &saved);
                self.refresh();
                Ok(saved)
            }
            Err(err) => {
                if err.is_not_found() {
                    tracing::warn!("transaction {id} no longer exists, dropping it");
                    self.remove_local(id);
                } else if inner.cache.server_epoch(&inner.key) == seen_epoch {
                    self.replace_local(id, &previous);
                } else {
                    tracing::warn!("not rolling back {id}: the list was refetched meanwhile");
                }
                tracing::error!("editing transaction {id} failed: {err}");
                Err(err.into())
            }
        }
    }

    /// Removes the record locally, then on the server, with the same
    /// rollback rules as [`edit`](Self::edit).
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.inner
            .features
            .require(Feature::BusinessTransactionEditing)?;
        let record = self.record_lock(id);
        let result = {
            let _guard = record.lock().await;
            self.delete_locked(id).await
        };
        self.release_record_lock(id, record);
        result
    }

    async fn delete_locked(&self, id: &str) -> Result<()> {
        let inner = &self.inner;
        let previous = self.get(id).ok_or_else(|| Self::not_found(id))?;

        let seen_epoch = inner.cache.server_epoch(&inner.key);
        let slot = self.remove_local(id);

        match inner.api.delete_transaction(id).await {
            Ok(()) => {
                tracing::info!("deleted transaction {id}");
                self.refresh();
                Ok(())
            }
            Err(err) => {
                if err.is_not_found() {
                    tracing::warn!("transaction {id} was already gone");
                    self.refresh();
                } else if inner.cache.server_epoch(&inner.key) != seen_epoch {
                    tracing::warn!("not rolling back {id}: the list was refetched meanwhile");
                } else if let Some(slot) = slot {
                    self.restore_local(slot, &previous);
                }
                tracing::error!("deleting transaction {id} failed: {err}");
                Err(err.into())
            }
        }
    }

    /// Asks the server for a category and opens an edit form with it
    /// pre-filled. Nothing is saved.
    pub async fn categorize(&self, id: &str) -> Result<EditForm> {
        self.inner
            .features
            .require(Feature::BusinessAiCategorization)?;
        let tx = self.get(id).ok_or_else(|| Self::not_found(id))?;
        let request = CategorizeRequest {
            description: tx.description.clone(),
            vendor: tx.vendor.clone(),
            amount: tx.amount,
        };
        let category = self.inner.api.categorize(&request).await?;
        tracing::debug!("suggested {} for {id}", category.as_str());
        Ok(EditForm::for_record(&tx, self.inner.tz).with_suggestion(category))
    }
}
