//! Orders domain module.
//!
//! The `Order` aggregate (pure state machine: Pending → Delivered | Cancelled)
//! and the Order Ledger View that projects it onto the orders sheet.

pub mod ledger;
pub mod order;

pub use ledger::{DATE_FORMAT, LedgerChange, LedgerError, OrderLedger, RowRef, SUPERSEDED, parse_status};
pub use order::{
    CancelOrder, Customer, MarkDelivered, Order, OrderCancelled, OrderCommand, OrderDelivered,
    OrderEvent, OrderLine, OrderPlaced, OrderRevised, OrderStatus, PlaceOrder, ReviseOrder,
};
