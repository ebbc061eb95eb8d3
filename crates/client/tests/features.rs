use std::sync::atomic::Ordering;

use api_types::{Money, export::DownloadScope, transaction::Action};
use client::{Error, config::Feature, transactions::EditPatch};

mod common;

use common::{Backend, WA_ID, logged_in_with, tx};

fn off() -> Option<String> {
    Some("false".to_string())
}

fn disabled(err: &Error, feature: Feature) -> bool {
    matches!(err, Error::FeatureDisabled(f) if *f == feature)
}

#[tokio::test]
async fn excel_export_can_be_switched_off() {
    let backend = Backend::with_transactions(vec![tx("a", 3, 9, Action::Sale, 1_000, "Kuih")]);
    let h = logged_in_with(backend, |settings| {
        settings.features.business_excel_export = off();
    })
    .await;

    let err = h
        .client
        .exporter()
        .excel(WA_ID, DownloadScope::All)
        .await
        .unwrap_err();

    assert!(disabled(&err, Feature::BusinessExcelExport));
    assert_eq!(h.backend.download_hits.load(Ordering::SeqCst), 0);
    assert!(h.sink.files().is_empty());

    // The local CSV is not part of the server export feature.
    let view = h.client.transactions(WA_ID);
    view.load().await.unwrap();
    h.client.exporter().csv(&view.filtered()).unwrap();
    assert_eq!(h.sink.files().len(), 1);
}

#[tokio::test]
async fn disabling_business_mode_disables_its_export() {
    let h = logged_in_with(Backend::with_transactions(vec![]), |settings| {
        settings.features.enable_business_mode = off();
    })
    .await;

    let err = h
        .client
        .exporter()
        .excel(WA_ID, DownloadScope::Sale)
        .await
        .unwrap_err();

    assert!(disabled(&err, Feature::BusinessExcelExport));
    assert_eq!(h.backend.download_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn editing_can_be_switched_off() {
    let backend = Backend::with_transactions(vec![
        tx("a", 3, 9, Action::Sale, 1_000, "Kuih"),
        tx("b", 4, 9, Action::Expense, 300, "Plastic bags"),
    ]);
    let h = logged_in_with(backend, |settings| {
        settings.features.business_transaction_editing = off();
    })
    .await;
    let view = h.client.transactions(WA_ID);
    view.load().await.unwrap();
    let before = view.filtered();

    let edit = view
        .edit(
            "a",
            EditPatch {
                amount: Some(Money::new(2_000)),
                ..EditPatch::default()
            },
        )
        .await
        .unwrap_err();
    let delete = view.delete("b").await.unwrap_err();

    assert!(disabled(&edit, Feature::BusinessTransactionEditing));
    assert!(disabled(&delete, Feature::BusinessTransactionEditing));
    assert_eq!(view.filtered(), before);
    assert_eq!(h.backend.update_hits.load(Ordering::SeqCst), 0);
    assert_eq!(h.backend.delete_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn categorization_can_be_switched_off() {
    let backend = Backend::with_transactions(vec![tx("a", 3, 9, Action::Purchase, 800, "Tepung")]);
    let h = logged_in_with(backend, |settings| {
        settings.features.business_ai_categorization = off();
    })
    .await;
    let view = h.client.transactions(WA_ID);
    view.load().await.unwrap();

    let err = view.categorize("a").await.unwrap_err();

    assert!(disabled(&err, Feature::BusinessAiCategorization));
    assert_eq!(h.backend.categorize_hits.load(Ordering::SeqCst), 0);
}
