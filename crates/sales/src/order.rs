use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use sheetkeeper_core::{Aggregate, AggregateRoot, DomainError, OrderId};
use sheetkeeper_events::Event;
use sheetkeeper_inventory::ItemId;
use sheetkeeper_schema::ColumnRole;

/// Order status lifecycle. `Delivered` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// The word written to the status column.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who placed the order. Fields the request leaves out stay empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub payment_mode: String,
}

/// Order line: resolved item, quantity, unit price snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// `None` only for lines read back from a sheet without a product id
    /// column; such lines are re-resolved by name.
    pub item_id: Option<ItemId>,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Option<Decimal>,
    /// Weight/colour/size carried over from the inventory row.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<ColumnRole, String>,
}

impl OrderLine {
    pub fn new(item_id: ItemId, product_name: impl Into<String>, quantity: u32) -> Self {
        Self {
            item_id: Some(item_id),
            product_name: product_name.into(),
            quantity,
            unit_price: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_unit_price(mut self, unit_price: Option<Decimal>) -> Self {
        self.unit_price = unit_price;
        self
    }

    pub fn with_attributes(mut self, attributes: BTreeMap<ColumnRole, String>) -> Self {
        self.attributes = attributes;
        self
    }

    /// `quantity × unit_price`, when the price is known.
    pub fn line_total(&self) -> Option<Decimal> {
        self.unit_price.map(|p| p * Decimal::from(self.quantity))
    }
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    status: OrderStatus,
    lines: Vec<OrderLine>,
    customer: Customer,
    notes: Option<String>,
    created_at: Option<DateTime<Utc>>,
    version: u64,
    placed: bool,
}

impl Order {
    /// Create an empty, not-yet-placed aggregate instance.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            status: OrderStatus::Pending,
            lines: Vec::new(),
            customer: Customer::default(),
            notes: None,
            created_at: None,
            version: 0,
            placed: false,
        }
    }

    /// Rebuild a placed order from its ledger projection.
    pub fn restore(
        id: OrderId,
        status: OrderStatus,
        lines: Vec<OrderLine>,
        customer: Customer,
        notes: Option<String>,
        created_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            status,
            lines,
            customer,
            notes,
            created_at,
            version: 0,
            placed: true,
        }
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn customer(&self) -> &Customer {
        &self.customer
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn is_placed(&self) -> bool {
        self.placed
    }

    pub fn is_modifiable(&self) -> bool {
        self.placed && self.status == OrderStatus::Pending
    }

    /// Sum of `quantity × unit_price` over priced lines.
    pub fn total(&self) -> Option<Decimal> {
        self.lines
            .iter()
            .map(OrderLine::line_total)
            .try_fold(Decimal::ZERO, |acc, t| t.map(|t| acc + t))
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub lines: Vec<OrderLine>,
    pub customer: Customer,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReviseOrder (replaces lines, customer and notes wholesale).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviseOrder {
    pub order_id: OrderId,
    pub lines: Vec<OrderLine>,
    pub customer: Customer,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkDelivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkDelivered {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    PlaceOrder(PlaceOrder),
    ReviseOrder(ReviseOrder),
    CancelOrder(CancelOrder),
    MarkDelivered(MarkDelivered),
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub lines: Vec<OrderLine>,
    pub customer: Customer,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderRevised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRevised {
    pub order_id: OrderId,
    pub previous_lines: Vec<OrderLine>,
    pub lines: Vec<OrderLine>,
    pub customer: Customer,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCancelled. `restored` are the lines whose stock is credited back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub restored: Vec<OrderLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderDelivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDelivered {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    OrderRevised(OrderRevised),
    OrderCancelled(OrderCancelled),
    OrderDelivered(OrderDelivered),
}

impl OrderEvent {
    pub fn order_id(&self) -> &OrderId {
        match self {
            OrderEvent::OrderPlaced(e) => &e.order_id,
            OrderEvent::OrderRevised(e) => &e.order_id,
            OrderEvent::OrderCancelled(e) => &e.order_id,
            OrderEvent::OrderDelivered(e) => &e.order_id,
        }
    }
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "sales.order.placed",
            OrderEvent::OrderRevised(_) => "sales.order.revised",
            OrderEvent::OrderCancelled(_) => "sales.order.cancelled",
            OrderEvent::OrderDelivered(_) => "sales.order.delivered",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::OrderRevised(e) => e.occurred_at,
            OrderEvent::OrderCancelled(e) => e.occurred_at,
            OrderEvent::OrderDelivered(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderPlaced(e) => {
                self.id = e.order_id.clone();
                self.status = OrderStatus::Pending;
                self.lines = e.lines.clone();
                self.customer = e.customer.clone();
                self.notes = e.notes.clone();
                self.created_at = Some(e.occurred_at);
                self.placed = true;
            }
            OrderEvent::OrderRevised(e) => {
                self.lines = e.lines.clone();
                self.customer = e.customer.clone();
                self.notes = e.notes.clone();
            }
            OrderEvent::OrderCancelled(_) => {
                self.status = OrderStatus::Cancelled;
            }
            OrderEvent::OrderDelivered(_) => {
                self.status = OrderStatus::Delivered;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            OrderCommand::ReviseOrder(cmd) => self.handle_revise(cmd),
            OrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
            OrderCommand::MarkDelivered(cmd) => self.handle_deliver(cmd),
        }
    }
}

impl Order {
    fn ensure_order_id(&self, order_id: &OrderId) -> Result<(), DomainError> {
        if &self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_placed(&self, order_id: &OrderId) -> Result<(), DomainError> {
        if !self.placed {
            return Err(DomainError::not_found());
        }
        self.ensure_order_id(order_id)
    }

    fn validate_lines(lines: &[OrderLine]) -> Result<(), DomainError> {
        if lines.is_empty() {
            return Err(DomainError::validation("an order needs at least one line"));
        }
        if let Some((i, _)) = lines.iter().enumerate().find(|(_, l)| l.quantity == 0) {
            return Err(DomainError::validation(format!(
                "line {}: quantity must be positive",
                i + 1
            )));
        }
        if let Some((i, _)) = lines
            .iter()
            .enumerate()
            .find(|(_, l)| l.product_name.trim().is_empty())
        {
            return Err(DomainError::validation(format!(
                "line {}: product name cannot be empty",
                i + 1
            )));
        }
        Ok(())
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.placed {
            return Err(DomainError::conflict("order already exists"));
        }
        self.ensure_order_id(&cmd.order_id)?;
        Self::validate_lines(&cmd.lines)?;

        Ok(vec![OrderEvent::OrderPlaced(OrderPlaced {
            order_id: cmd.order_id.clone(),
            lines: cmd.lines.clone(),
            customer: cmd.customer.clone(),
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revise(&self, cmd: &ReviseOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_placed(&cmd.order_id)?;
        if self.status != OrderStatus::Pending {
            return Err(DomainError::invalid_transition(format!(
                "cannot revise a {} order",
                self.status.as_str().to_lowercase()
            )));
        }
        Self::validate_lines(&cmd.lines)?;

        Ok(vec![OrderEvent::OrderRevised(OrderRevised {
            order_id: cmd.order_id.clone(),
            previous_lines: self.lines.clone(),
            lines: cmd.lines.clone(),
            customer: cmd.customer.clone(),
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_placed(&cmd.order_id)?;
        match self.status {
            // Already cancelled: nothing to do, and nothing to credit twice.
            OrderStatus::Cancelled => Ok(vec![]),
            OrderStatus::Delivered => Err(DomainError::invalid_transition(
                "cannot cancel a delivered order",
            )),
            OrderStatus::Pending => Ok(vec![OrderEvent::OrderCancelled(OrderCancelled {
                order_id: cmd.order_id.clone(),
                restored: self.lines.clone(),
                occurred_at: cmd.occurred_at,
            })]),
        }
    }

    fn handle_deliver(&self, cmd: &MarkDelivered) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_placed(&cmd.order_id)?;
        match self.status {
            OrderStatus::Delivered => Ok(vec![]),
            OrderStatus::Cancelled => Err(DomainError::invalid_transition(
                "cannot deliver a cancelled order",
            )),
            OrderStatus::Pending => Ok(vec![OrderEvent::OrderDelivered(OrderDelivered {
                order_id: cmd.order_id.clone(),
                occurred_at: cmd.occurred_at,
            })]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn test_order_id() -> OrderId {
        OrderId::parse("ORD-1").unwrap()
    }

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap()
    }

    fn line(item: &str, name: &str, quantity: u32) -> OrderLine {
        OrderLine::new(ItemId::parse(item).unwrap(), name, quantity)
            .with_unit_price(Some(Decimal::new(850, 0)))
    }

    fn customer() -> Customer {
        Customer {
            name: "Ayesha".into(),
            email: "ayesha@example.com".into(),
            address: "12 Mall Road".into(),
            payment_mode: "COD".into(),
        }
    }

    fn placed_order() -> Order {
        let mut order = Order::empty(test_order_id());
        order
            .execute(&OrderCommand::PlaceOrder(PlaceOrder {
                order_id: test_order_id(),
                lines: vec![line("FW-1", "Face Wash", 3)],
                customer: customer(),
                notes: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        order
    }

    #[test]
    fn place_order_emits_order_placed_event() {
        let order = Order::empty(test_order_id());
        let cmd = PlaceOrder {
            order_id: test_order_id(),
            lines: vec![line("FW-1", "Face Wash", 3)],
            customer: customer(),
            notes: Some("ring twice".into()),
            occurred_at: test_time(),
        };

        let events = order.handle(&OrderCommand::PlaceOrder(cmd)).unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            OrderEvent::OrderPlaced(e) => {
                assert_eq!(e.order_id, test_order_id());
                assert_eq!(e.lines.len(), 1);
                assert_eq!(e.lines[0].quantity, 3);
                assert_eq!(e.notes.as_deref(), Some("ring twice"));
            }
            _ => panic!("Expected OrderPlaced event"),
        }
    }

    #[test]
    fn placed_order_is_pending_with_created_at() {
        let order = placed_order();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.created_at(), Some(test_time()));
        assert_eq!(order.total(), Some(Decimal::new(2550, 0)));
        assert_eq!(order.version(), 1);
    }

    #[test]
    fn place_rejects_empty_and_zero_quantity_lines() {
        let order = Order::empty(test_order_id());
        let place = |lines| {
            order.handle(&OrderCommand::PlaceOrder(PlaceOrder {
                order_id: test_order_id(),
                lines,
                customer: customer(),
                notes: None,
                occurred_at: test_time(),
            }))
        };

        assert!(matches!(place(vec![]), Err(DomainError::Validation(_))));
        match place(vec![line("A", "Soap", 1), line("B", "Towel", 0)]) {
            Err(DomainError::Validation(msg)) if msg.contains("line 2") => {}
            other => panic!("Expected validation error for line 2, got {other:?}"),
        }
    }

    #[test]
    fn cannot_place_twice() {
        let order = placed_order();
        let err = order
            .handle(&OrderCommand::PlaceOrder(PlaceOrder {
                order_id: test_order_id(),
                lines: vec![line("FW-1", "Face Wash", 1)],
                customer: customer(),
                notes: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn revise_preserves_id_and_created_at() {
        let mut order = placed_order();
        let later = test_time() + chrono::Duration::hours(1);

        let events = order
            .execute(&OrderCommand::ReviseOrder(ReviseOrder {
                order_id: test_order_id(),
                lines: vec![line("FW-1", "Face Wash", 1), line("FC-1", "Face Cream", 2)],
                customer: customer(),
                notes: None,
                occurred_at: later,
            }))
            .unwrap();

        match &events[0] {
            OrderEvent::OrderRevised(e) => {
                assert_eq!(e.previous_lines.len(), 1);
                assert_eq!(e.lines.len(), 2);
            }
            _ => panic!("Expected OrderRevised event"),
        }
        assert_eq!(order.id(), &test_order_id());
        assert_eq!(order.created_at(), Some(test_time()));
        assert_eq!(order.lines().len(), 2);
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut order = placed_order();
        let cancel = OrderCommand::CancelOrder(CancelOrder {
            order_id: test_order_id(),
            occurred_at: test_time(),
        });

        let first = order.execute(&cancel).unwrap();
        match &first[..] {
            [OrderEvent::OrderCancelled(e)] => assert_eq!(e.restored.len(), 1),
            _ => panic!("Expected a single OrderCancelled event"),
        }
        assert_eq!(order.status(), OrderStatus::Cancelled);

        let second = order.execute(&cancel).unwrap();
        assert!(second.is_empty());
        assert_eq!(order.status(), OrderStatus::Cancelled);
    }

    #[test]
    fn cannot_cancel_delivered_order() {
        let mut order = placed_order();
        order
            .execute(&OrderCommand::MarkDelivered(MarkDelivered {
                order_id: test_order_id(),
                occurred_at: test_time(),
            }))
            .unwrap();
        assert_eq!(order.status(), OrderStatus::Delivered);

        let err = order
            .handle(&OrderCommand::CancelOrder(CancelOrder {
                order_id: test_order_id(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::InvalidTransition(msg) if msg.contains("delivered") => {}
            _ => panic!("Expected InvalidTransition for cancelling a delivered order"),
        }
    }

    #[test]
    fn cannot_revise_or_deliver_cancelled_order() {
        let mut order = placed_order();
        order
            .execute(&OrderCommand::CancelOrder(CancelOrder {
                order_id: test_order_id(),
                occurred_at: test_time(),
            }))
            .unwrap();

        let revise = order.handle(&OrderCommand::ReviseOrder(ReviseOrder {
            order_id: test_order_id(),
            lines: vec![line("FW-1", "Face Wash", 1)],
            customer: customer(),
            notes: None,
            occurred_at: test_time(),
        }));
        assert!(matches!(revise, Err(DomainError::InvalidTransition(_))));

        let deliver = order.handle(&OrderCommand::MarkDelivered(MarkDelivered {
            order_id: test_order_id(),
            occurred_at: test_time(),
        }));
        assert!(matches!(deliver, Err(DomainError::InvalidTransition(_))));
    }

    #[test]
    fn commands_on_unplaced_order_are_not_found() {
        let order = Order::empty(test_order_id());
        let err = order
            .handle(&OrderCommand::CancelOrder(CancelOrder {
                order_id: test_order_id(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn restored_orders_accept_transitions() {
        let mut order = Order::restore(
            test_order_id(),
            OrderStatus::Pending,
            vec![line("FW-1", "Face Wash", 2)],
            customer(),
            None,
            None,
        );
        assert_eq!(order.version(), 0);

        order
            .execute(&OrderCommand::MarkDelivered(MarkDelivered {
                order_id: test_order_id(),
                occurred_at: test_time(),
            }))
            .unwrap();
        assert_eq!(order.status(), OrderStatus::Delivered);
        assert_eq!(order.version(), 1);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let order = placed_order();
        let before = order.clone();

        let cancel = OrderCommand::CancelOrder(CancelOrder {
            order_id: test_order_id(),
            occurred_at: test_time(),
        });
        let events1 = order.handle(&cancel).unwrap();
        let events2 = order.handle(&cancel).unwrap();

        assert_eq!(order, before);
        assert_eq!(events1, events2);
    }

    #[test]
    fn line_total_is_none_without_price() {
        let priced = line("A", "Soap", 4);
        assert_eq!(priced.line_total(), Some(Decimal::new(3400, 0)));

        let unpriced = OrderLine::new(ItemId::parse("B").unwrap(), "Towel", 2);
        assert_eq!(unpriced.line_total(), None);
    }

    fn command_strategy() -> impl Strategy<Value = u8> {
        0u8..3
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            .. ProptestConfig::default()
        })]

        #[test]
        fn terminal_states_are_never_left(commands in proptest::collection::vec(command_strategy(), 1..20)) {
            let mut order = placed_order();
            let mut reached_terminal: Option<OrderStatus> = None;

            for c in commands {
                let command = match c {
                    0 => OrderCommand::CancelOrder(CancelOrder {
                        order_id: test_order_id(),
                        occurred_at: test_time(),
                    }),
                    1 => OrderCommand::MarkDelivered(MarkDelivered {
                        order_id: test_order_id(),
                        occurred_at: test_time(),
                    }),
                    _ => OrderCommand::ReviseOrder(ReviseOrder {
                        order_id: test_order_id(),
                        lines: vec![line("FW-1", "Face Wash", 2)],
                        customer: customer(),
                        notes: None,
                        occurred_at: test_time(),
                    }),
                };
                let _ = order.execute(&command);

                if let Some(terminal) = reached_terminal {
                    prop_assert_eq!(order.status(), terminal);
                } else if order.status().is_terminal() {
                    reached_terminal = Some(order.status());
                }
            }
        }
    }
}
