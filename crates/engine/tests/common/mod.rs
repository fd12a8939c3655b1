#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use sheetkeeper_core::ManualClock;
use sheetkeeper_engine::{LineRequest, OrderEnvelope, OrderRequest, ReconciliationEngine};
use sheetkeeper_events::InMemoryEventBus;
use sheetkeeper_infra::{ConnectionConfig, InMemorySheetStore};
use sheetkeeper_sales::Customer;
use sheetkeeper_schema::{SheetRef, Table};

pub type Bus = Arc<InMemoryEventBus<OrderEnvelope>>;
pub type Engine = ReconciliationEngine<Arc<InMemorySheetStore>, Bus>;

/// Column of the stock cell in [`inventory_table`].
pub const STOCK_COL: usize = 3;

pub const ORDER_HEADERS: [&str; 11] = [
    "Order ID",
    "Date",
    "Customer Name",
    "Email",
    "Product ID",
    "Product Name",
    "Quantity",
    "Unit Price",
    "Total",
    "Status",
    "Notes",
];

pub fn inventory_sheet() -> SheetRef {
    SheetRef::new("shop", "Inventory")
}

pub fn orders_sheet() -> SheetRef {
    SheetRef::new("shop", "Orders")
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Row order: Face Wash, Sunscreen SPF 50, Lip Balm (discontinued),
/// Aloe Gel Small, Aloe Gel Large, Hair Cream (out of stock).
pub fn inventory_table() -> Table {
    Table::new(
        strings(&["Product ID", "Product Name", "Price", "Stock", "Status"]),
        vec![
            strings(&["FW-1", "Face Wash", "850", "20", "Active"]),
            strings(&["SS-50", "Sunscreen SPF 50", "Rs. 1,200", "10", "Active"]),
            strings(&["LB-1", "Lip Balm", "300", "8", "Discontinued"]),
            strings(&["AG-S", "Aloe Gel Small", "400", "6", ""]),
            strings(&["AG-L", "Aloe Gel Large", "700", "6", ""]),
            strings(&["HC-1", "Hair Cream", "500", "0", "Active"]),
        ],
    )
}

pub fn orders_table() -> Table {
    Table::new(strings(&ORDER_HEADERS), Vec::new())
}

pub struct Harness {
    pub engine: Engine,
    pub store: Arc<InMemorySheetStore>,
    pub bus: Bus,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_tables(inventory_table(), orders_table())
    }

    pub fn with_tables(inventory: Table, orders: Table) -> Self {
        let store = Arc::new(InMemorySheetStore::new());
        store.insert(inventory_sheet(), inventory);
        store.insert(orders_sheet(), orders);

        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let config = ConnectionConfig::new(inventory_sheet(), orders_sheet());
        let engine = ReconciliationEngine::new(Arc::clone(&store), Arc::clone(&bus), config)
            .with_clock(clock.clone());

        Self {
            engine,
            store,
            bus,
            clock,
        }
    }

    /// Stock cell of the inventory data row `row`, as written in the sheet.
    pub fn stock(&self, row: usize) -> i64 {
        let table = self.store.table(&inventory_sheet()).unwrap();
        table.cell(row, STOCK_COL).parse().unwrap()
    }

    pub fn orders(&self) -> Table {
        self.store.table(&orders_sheet()).unwrap()
    }

    pub fn advance(&self, seconds: i64) {
        self.clock.advance(Duration::seconds(seconds));
    }
}

pub fn customer(name: &str) -> Customer {
    Customer {
        name: name.into(),
        email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        address: "12 Mall Road, Lahore".into(),
        payment_mode: "Cash on delivery".into(),
    }
}

pub fn request(customer_name: &str, lines: &[(&str, i64)]) -> OrderRequest {
    OrderRequest::new(
        lines
            .iter()
            .map(|(product, quantity)| LineRequest::new(*product, *quantity))
            .collect(),
        customer(customer_name),
    )
}
