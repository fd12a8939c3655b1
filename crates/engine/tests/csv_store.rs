//! The engine against CSV-backed sheets on disk.

mod common;

use std::fs;
use std::sync::Arc;

use sheetkeeper_core::AggregateRoot;
use sheetkeeper_engine::{ReconcileError, ReconciliationEngine};
use sheetkeeper_events::InMemoryEventBus;
use sheetkeeper_infra::{ConnectionConfig, CsvSheetStore, TabularReader};

use common::*;

fn engine_in(dir: &tempfile::TempDir) -> ReconciliationEngine<CsvSheetStore, Bus> {
    let store = CsvSheetStore::new(dir.path());
    store.create(&inventory_sheet(), &inventory_table()).unwrap();
    store.create(&orders_sheet(), &orders_table()).unwrap();
    ReconciliationEngine::new(
        store,
        Arc::new(InMemoryEventBus::new()),
        ConnectionConfig::new(inventory_sheet(), orders_sheet()),
    )
}

#[test]
fn orders_round_trip_through_csv_files() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(&dir);

    let placed = engine
        .create_order(request("Ayesha Khan", &[("Face Wash", 2), ("Sunscreen", 1)]))
        .unwrap();
    let order_id = placed.order.id().clone();

    let inventory = engine.store().read_table(&inventory_sheet()).unwrap();
    assert_eq!(inventory.cell(0, STOCK_COL), "18");
    assert_eq!(inventory.cell(1, STOCK_COL), "9");
    // Untouched cells keep their original text.
    assert_eq!(inventory.cell(1, 2), "Rs. 1,200");

    let raw = fs::read_to_string(engine.store().path_of(&orders_sheet())).unwrap();
    assert!(raw.starts_with("Order ID,Date,Customer Name"));
    assert_eq!(raw.lines().count(), 3);

    // A fresh engine sees the committed order.
    let (store, bus) = engine.into_parts();
    let reopened = ReconciliationEngine::new(store, bus, ConnectionConfig::new(inventory_sheet(), orders_sheet()));
    let order = reopened.get_order(&order_id).unwrap();
    assert_eq!(order.lines().len(), 2);
    assert_eq!(order.customer().name, "Ayesha Khan");

    reopened.cancel_order(&order_id).unwrap();
    let inventory = reopened.store().read_table(&inventory_sheet()).unwrap();
    assert_eq!(inventory.cell(0, STOCK_COL), "20");
    assert_eq!(inventory.cell(1, STOCK_COL), "10");
}

#[test]
fn a_missing_sheet_file_is_reported_without_writes() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(&dir);
    fs::remove_file(engine.store().path_of(&orders_sheet())).unwrap();

    match engine.create_order(request("Ayesha Khan", &[("Face Wash", 2)])) {
        Err(ReconcileError::Store(_)) => {}
        other => panic!("expected a store error, got {other:?}"),
    }
    let inventory = engine.store().read_table(&inventory_sheet()).unwrap();
    assert_eq!(inventory.cell(0, STOCK_COL), "20");
}
