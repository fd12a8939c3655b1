//! Order Reconciliation Engine.
//!
//! Validates order requests against the inventory sheet and commits the
//! resulting stock deltas and order rows. Every state-changing operation runs
//! the same pipeline:
//!
//! ```text
//! request
//!   ↓
//! 1. Dedup check (create only; recorded atomically)
//!   ↓
//! 2. Read both sheets, infer/reuse schemas, resolve every line
//!   ↓
//! 3. Acquire the scope: every touched item + the order id
//!   ↓
//! 4. Re-read and re-resolve under the scope (retry if the scope grew)
//!   ↓
//! 5. Plan all stock deltas at once; any line failing aborts the whole order
//!   ↓
//! 6. Write inventory cells, then order rows; undo what landed on failure
//!   ↓
//! 7. Publish order events
//! ```
//!
//! Nothing is written before step 6, so every error except
//! [`ReconcileError::CommitUncertain`] leaves both sheets untouched.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

use sheetkeeper_core::{Aggregate, AggregateRoot, Clock, OrderId, SystemClock};
use sheetkeeper_events::{EventBus, EventEnvelope};
use sheetkeeper_infra::{
    ConnectionConfig, DedupGuard, DedupOutcome, ScopeBusy, ScopeKey, ScopeLocks, StoreError,
    TabularReader, TabularWriter,
};
use sheetkeeper_inventory::{InventoryItem, InventoryView, ItemId, MatchTier, StockChange, StockError, StockPlan};
use sheetkeeper_sales::{
    CancelOrder, LedgerChange, LedgerError, MarkDelivered, Order, OrderCommand, OrderEvent,
    OrderLedger, OrderLine, OrderStatus, PlaceOrder, ReviseOrder,
};
use sheetkeeper_schema::{CacheStats, ColumnRole, SchemaCache, SheetKind, SheetWrite};

use crate::error::{IssueKind, LineIssue, ReconcileError};
use crate::fingerprint::Fingerprint;
use crate::request::{
    InventoryListing, LineRequest, OrderListing, OrderOutcome, OrderQuery, OrderRequest,
    OrderResult, OrderSnapshot, OrderUpdate, ProcessRequest, ProductCandidate, StockAdjustment,
    StockLevel,
};

/// Aggregate type carried by published envelopes.
pub const AGGREGATE_TYPE: &str = "sales.order";

/// Attempts at settling a scope whose key set keeps changing under us.
const MAX_SCOPE_ATTEMPTS: usize = 3;

pub type OrderEnvelope = EventEnvelope<OrderEvent>;

/// A request line matched to an inventory item.
#[derive(Debug, Clone)]
struct ResolvedLine {
    /// 0-based position in the request.
    index: usize,
    query: String,
    item_id: ItemId,
    line: OrderLine,
}

pub struct ReconciliationEngine<S, B> {
    store: S,
    bus: B,
    config: ConnectionConfig,
    schemas: SchemaCache,
    dedup: DedupGuard,
    locks: ScopeLocks,
    clock: Arc<dyn Clock>,
    sequence: AtomicU64,
}

impl<S, B> core::fmt::Debug for ReconciliationEngine<S, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("config", &self.config)
            .field("schemas", &self.schemas.stats())
            .field("pending_fingerprints", &self.dedup.len())
            .finish_non_exhaustive()
    }
}

impl<S, B> ReconciliationEngine<S, B> {
    pub fn new(store: S, bus: B, config: ConnectionConfig) -> Self {
        Self {
            dedup: DedupGuard::new(config.dedup_window()),
            locks: ScopeLocks::new(config.lock_timeout()),
            schemas: SchemaCache::new(),
            clock: Arc::new(SystemClock),
            sequence: AtomicU64::new(0),
            store,
            bus,
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn schema_stats(&self) -> CacheStats {
        self.schemas.stats()
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> ReconciliationEngine<S, B>
where
    S: TabularReader + TabularWriter,
    B: EventBus<OrderEnvelope>,
{
    /// Boundary entry point for create and update.
    pub fn process_order(&self, request: ProcessRequest) -> OrderResult {
        match request {
            ProcessRequest::Create(request) => self.create_order(request).into(),
            ProcessRequest::Update { order_id, update } => self.update_order(&order_id, update).into(),
        }
    }

    /// Place a new order.
    ///
    /// The submission fingerprint is recorded before anything else and is
    /// released again if the order is rejected before a write, so a corrected
    /// resubmission is not mistaken for a duplicate.
    #[instrument(skip_all, fields(lines = request.lines.len()))]
    pub fn create_order(&self, request: OrderRequest) -> Result<OrderOutcome, ReconcileError> {
        let now = self.clock.now();
        let fingerprint = Fingerprint::of(&request);

        if let DedupOutcome::Duplicate(first_seen) = self.dedup.check_and_record(fingerprint.as_str(), now) {
            warn!(%fingerprint, %first_seen, "duplicate submission rejected");
            return Err(ReconcileError::DuplicateSubmission { first_seen });
        }

        let result = self.place(&request, now);
        if let Err(err) = &result {
            if !err.is_commit_uncertain() {
                self.dedup.release(fingerprint.as_str(), now);
            }
        }
        result
    }

    fn place(&self, request: &OrderRequest, now: DateTime<Utc>) -> Result<OrderOutcome, ReconcileError> {
        let order_id = OrderId::generate();

        self.in_scope(
            || {
                let inventory = self.load_inventory()?;
                let lines = resolve_lines(&inventory, &request.lines)?;
                let mut keys = item_keys(lines.iter().map(|l| &l.item_id));
                keys.insert(ScopeKey::Order(order_id.clone()));
                Ok(((inventory, lines), keys))
            },
            |(inventory, lines)| {
                let deltas = lines
                    .iter()
                    .map(|l| (l.item_id.clone(), -i64::from(l.line.quantity)));
                let plan = inventory
                    .plan(deltas)
                    .map_err(|errors| stock_rejection(errors, &lines, &HashMap::new()))?;

                let mut order = Order::empty(order_id.clone());
                let events = order
                    .execute(&OrderCommand::PlaceOrder(PlaceOrder {
                        order_id: order_id.clone(),
                        lines: lines.into_iter().map(|l| l.line).collect(),
                        customer: request.customer.clone(),
                        notes: request.notes.clone().filter(|n| !n.trim().is_empty()),
                        occurred_at: now,
                    }))
                    .map_err(|e| ReconcileError::from_domain(&order_id, e))?;

                let mut ledger = self.load_ledger()?;
                let change = ledger
                    .append(&order)
                    .map_err(|e| ledger_error(&order_id, e))?;

                self.commit(plan.changes(), Some(&change))?;
                self.publish(&order, events);

                info!(
                    order_id = %order_id,
                    lines = order.lines().len(),
                    stock_writes = plan.changes().len(),
                    "order placed"
                );
                Ok(OrderOutcome {
                    order,
                    stock_changes: plan.changes().to_vec(),
                    unchanged: false,
                })
            },
        )
    }

    /// Revise a pending order.
    ///
    /// The original consumption is credited back and the new lines debited in
    /// one plan, so only the net delta per item is written and a failed
    /// re-validation leaves the order and stock exactly as they were.
    #[instrument(skip_all, fields(order_id = %order_id))]
    pub fn update_order(&self, order_id: &OrderId, update: OrderUpdate) -> Result<OrderOutcome, ReconcileError> {
        if update.is_empty() {
            return Err(ReconcileError::Validation("update changes nothing".into()));
        }
        let now = self.clock.now();

        self.in_scope(
            || {
                let inventory = self.load_inventory()?;
                let ledger = self.load_ledger()?;
                let current = ledger
                    .find_by_id(order_id)
                    .map_err(|e| ledger_error(order_id, e))?;
                if current.status() != OrderStatus::Pending {
                    return Err(ReconcileError::InvalidTransition(format!(
                        "order {order_id} is {} and can no longer be modified",
                        current.status()
                    )));
                }

                let consumed = consumed_items(&inventory, current);
                let lines = match &update.lines {
                    Some(requested) => Some(resolve_lines(&inventory, requested)?),
                    None => None,
                };

                let mut keys = item_keys(
                    consumed
                        .iter()
                        .map(|(id, _)| id)
                        .chain(lines.iter().flatten().map(|l| &l.item_id)),
                );
                keys.insert(ScopeKey::Order(order_id.clone()));
                Ok(((inventory, ledger, consumed, lines), keys))
            },
            |(inventory, mut ledger, consumed, lines)| {
                let current = ledger
                    .find_by_id(order_id)
                    .map_err(|e| ledger_error(order_id, e))?
                    .clone();

                let (new_lines, plan) = match lines {
                    Some(lines) => {
                        let mut credits: HashMap<ItemId, i64> = HashMap::new();
                        for (id, quantity) in &consumed {
                            *credits.entry(id.clone()).or_default() += quantity;
                        }
                        let deltas = consumed.iter().cloned().chain(
                            lines
                                .iter()
                                .map(|l| (l.item_id.clone(), -i64::from(l.line.quantity))),
                        );
                        let plan = inventory
                            .plan(deltas)
                            .map_err(|errors| stock_rejection(errors, &lines, &credits))?;
                        (lines.into_iter().map(|l| l.line).collect(), plan)
                    }
                    None => (current.lines().to_vec(), StockPlan::default()),
                };

                let command = OrderCommand::ReviseOrder(ReviseOrder {
                    order_id: order_id.clone(),
                    lines: new_lines,
                    customer: update
                        .customer
                        .clone()
                        .unwrap_or_else(|| current.customer().clone()),
                    notes: match &update.notes {
                        Some(notes) => Some(notes.clone()).filter(|n| !n.trim().is_empty()),
                        None => current.notes().map(str::to_string),
                    },
                    occurred_at: now,
                });

                let mut events = Vec::new();
                let change = ledger
                    .update(order_id, |order| {
                        events = order.execute(&command)?;
                        Ok(())
                    })
                    .map_err(|e| ledger_error(order_id, e))?;
                let order = ledger
                    .find_by_id(order_id)
                    .map_err(|e| ledger_error(order_id, e))?
                    .clone();

                self.commit(plan.changes(), Some(&change))?;
                self.publish(&order, events);

                info!(
                    order_id = %order_id,
                    lines = order.lines().len(),
                    stock_writes = plan.changes().len(),
                    "order revised"
                );
                Ok(OrderOutcome {
                    order,
                    stock_changes: plan.changes().to_vec(),
                    unchanged: false,
                })
            },
        )
    }

    /// Cancel an order, crediting back exactly what its lines consumed.
    ///
    /// Cancelling an already-cancelled order succeeds without touching stock.
    #[instrument(skip_all, fields(order_id = %order_id))]
    pub fn cancel_order(&self, order_id: &OrderId) -> Result<OrderOutcome, ReconcileError> {
        let now = self.clock.now();
        let command = OrderCommand::CancelOrder(CancelOrder {
            order_id: order_id.clone(),
            occurred_at: now,
        });
        self.transition(order_id, command, true)
    }

    /// Mark a pending order delivered. Delivering twice is a no-op.
    #[instrument(skip_all, fields(order_id = %order_id))]
    pub fn deliver_order(&self, order_id: &OrderId) -> Result<OrderOutcome, ReconcileError> {
        let now = self.clock.now();
        let command = OrderCommand::MarkDelivered(MarkDelivered {
            order_id: order_id.clone(),
            occurred_at: now,
        });
        self.transition(order_id, command, false)
    }

    /// Status transition without new lines; `restores_stock` credits the
    /// order's consumption back.
    fn transition(
        &self,
        order_id: &OrderId,
        command: OrderCommand,
        restores_stock: bool,
    ) -> Result<OrderOutcome, ReconcileError> {
        self.in_scope(
            || {
                let inventory = self.load_inventory()?;
                let ledger = self.load_ledger()?;
                let current = ledger
                    .find_by_id(order_id)
                    .map_err(|e| ledger_error(order_id, e))?;

                let consumed = if restores_stock && current.status() == OrderStatus::Pending {
                    consumed_items(&inventory, current)
                } else {
                    Vec::new()
                };

                let mut keys = item_keys(consumed.iter().map(|(id, _)| id));
                keys.insert(ScopeKey::Order(order_id.clone()));
                Ok(((inventory, ledger, consumed), keys))
            },
            |(inventory, mut ledger, consumed)| {
                let mut events = Vec::new();
                let change = ledger
                    .update(order_id, |order| {
                        events = order.execute(&command)?;
                        Ok(())
                    })
                    .map_err(|e| ledger_error(order_id, e))?;
                let order = ledger
                    .find_by_id(order_id)
                    .map_err(|e| ledger_error(order_id, e))?
                    .clone();

                if events.is_empty() {
                    info!(order_id = %order_id, status = %order.status(), "order already in requested state");
                    return Ok(OrderOutcome {
                        order,
                        stock_changes: Vec::new(),
                        unchanged: true,
                    });
                }

                let plan = inventory
                    .plan(consumed)
                    .map_err(|errors| stock_rejection(errors, &[], &HashMap::new()))?;

                self.commit(plan.changes(), Some(&change))?;
                self.publish(&order, events);

                info!(
                    order_id = %order_id,
                    status = %order.status(),
                    stock_writes = plan.changes().len(),
                    "order status changed"
                );
                Ok(OrderOutcome {
                    order,
                    stock_changes: plan.changes().to_vec(),
                    unchanged: false,
                })
            },
        )
    }

    pub fn get_order(&self, order_id: &OrderId) -> Result<Order, ReconcileError> {
        let ledger = self.load_ledger()?;
        ledger
            .find_by_id(order_id)
            .cloned()
            .map_err(|e| ledger_error(order_id, e))
    }

    /// Orders in the ledger, most recent first.
    ///
    /// Orders without a readable date sort after dated ones, newest id first.
    /// Orders whose rows cannot be read are counted but not listed.
    pub fn list_orders(&self, query: &OrderQuery) -> Result<OrderListing, ReconcileError> {
        let ledger = self.load_ledger()?;
        let mut orders: Vec<&Order> = ledger
            .orders()
            .filter(|order| query.status.is_none_or(|status| order.status() == status))
            .collect();
        orders.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(a.id()))
        });

        let total = orders.len();
        let limit = query.limit.unwrap_or(total);
        debug!(total, limit, malformed = ledger.malformed_count(), "orders listed");
        Ok(OrderListing {
            total,
            malformed: ledger.malformed_count(),
            orders: orders.into_iter().take(limit).map(OrderSnapshot::from).collect(),
        })
    }

    /// Every readable inventory item in sheet order, plus the rows that were
    /// left out.
    pub fn list_inventory(&self) -> Result<InventoryListing, ReconcileError> {
        let inventory = self.load_inventory()?;
        Ok(InventoryListing {
            items: inventory.items().iter().map(StockLevel::from).collect(),
            rejected_rows: inventory.rejected_rows().to_vec(),
        })
    }

    /// Manual signed stock correction for one product, outside any order.
    ///
    /// The product is resolved like an order line (off-sale items included);
    /// a reduction below zero is refused. No order events are published.
    #[instrument(skip_all, fields(query = %query, delta = delta))]
    pub fn adjust_stock(&self, query: &str, delta: i64) -> Result<StockAdjustment, ReconcileError> {
        if delta == 0 {
            return Err(ReconcileError::Validation("stock adjustment of zero changes nothing".into()));
        }
        let rejected = |kind| {
            ReconcileError::Rejected(vec![LineIssue {
                line: 1,
                query: query.to_string(),
                kind,
            }])
        };

        self.in_scope(
            || {
                let inventory = self.load_inventory()?;
                let item_id = resolve_item(&inventory, query).map_err(rejected)?.id().clone();
                let keys = item_keys([&item_id]);
                Ok(((inventory, item_id), keys))
            },
            |(mut inventory, item_id)| {
                let Some(item) = inventory.get(&item_id).cloned() else {
                    return Err(rejected(IssueKind::ProductNotFound));
                };
                let before = item.stock();
                let after = inventory.reserve(&item_id, delta).map_err(|err| match err {
                    StockError::InsufficientStock {
                        item_id,
                        requested,
                        available,
                    } => rejected(IssueKind::InsufficientStock {
                        item_id,
                        requested,
                        available,
                    }),
                    StockError::UnknownItem(_) => rejected(IssueKind::ProductNotFound),
                    StockError::Overflow(_) => rejected(IssueKind::InvalidQuantity { quantity: delta }),
                })?;

                let change = StockChange {
                    item_id: item_id.clone(),
                    row: item.row(),
                    col: inventory.schema().required(ColumnRole::Quantity),
                    before,
                    after,
                };
                self.commit(std::slice::from_ref(&change), None)?;

                info!(item_id = %item_id, before, after, "stock adjusted");
                Ok(StockAdjustment {
                    item_id,
                    name: item.name().to_string(),
                    before,
                    after,
                })
            },
        )
    }

    /// Read-only product lookup, best match first.
    pub fn resolve_product(&self, query: &str) -> Result<Vec<ProductCandidate>, ReconcileError> {
        let inventory = self.load_inventory()?;
        Ok(inventory
            .find_by_name(query)
            .iter()
            .map(ProductCandidate::from)
            .collect())
    }

    fn load_inventory(&self) -> Result<InventoryView, ReconcileError> {
        let sheet = &self.config.inventory;
        let table = self.store.read_table(sheet)?;
        let schema = self
            .schemas
            .resolve(sheet, SheetKind::Inventory, &table.headers)?;
        Ok(InventoryView::build(schema, &table).with_policy(self.config.match_policy()))
    }

    fn load_ledger(&self) -> Result<OrderLedger, ReconcileError> {
        let sheet = &self.config.orders;
        let table = self.store.read_table(sheet)?;
        let schema = self.schemas.resolve(sheet, SheetKind::Orders, &table.headers)?;
        Ok(OrderLedger::build(schema, &table))
    }

    /// Run `commit` while holding every key `prepare` reports.
    ///
    /// `prepare` reads current state and names the keys it needs. It runs once
    /// optimistically, then again under the acquired scope; if the second
    /// read needs keys the scope lacks, the scope is widened and retried.
    fn in_scope<P, T>(
        &self,
        mut prepare: impl FnMut() -> Result<(P, BTreeSet<ScopeKey>), ReconcileError>,
        commit: impl FnOnce(P) -> Result<T, ReconcileError>,
    ) -> Result<T, ReconcileError> {
        let started = Instant::now();
        let (_, mut keys) = prepare()?;

        for attempt in 1..=MAX_SCOPE_ATTEMPTS {
            let guard = self.locks.acquire(keys.iter().cloned())?;
            let (prepared, needed) = prepare()?;
            if needed.iter().all(|key| guard.covers(key)) {
                return commit(prepared);
            }
            debug!(attempt, "scope changed while acquiring; retrying");
            drop(guard);
            keys.extend(needed);
        }

        Err(ReconcileError::ScopeBusy(ScopeBusy {
            keys: keys.into_iter().collect(),
            waited: started.elapsed(),
        }))
    }

    /// Inventory cells first, then order rows.
    ///
    /// A failed write is never retried. Every write that already landed is
    /// taken back, order rows first and stock cells last, and the failure is
    /// reported as commit-uncertain.
    fn commit(&self, stock: &[StockChange], ledger: Option<&LedgerChange>) -> Result<(), ReconcileError> {
        let mut written: Vec<&StockChange> = Vec::with_capacity(stock.len());
        for change in stock {
            if let Err(source) = self.store.apply(&self.config.inventory, &change.write()) {
                return Err(self.compensate(&written, ledger, &[], source));
            }
            written.push(change);
        }

        let Some(change) = ledger else {
            return Ok(());
        };
        let mut landed: Vec<(usize, usize)> = Vec::with_capacity(change.writes.len());
        for (index, write) in change.writes.iter().enumerate() {
            let result = match write {
                SheetWrite::Cell { row, col, value } => self
                    .store
                    .write_cell(&self.config.orders, *row, *col, value)
                    .map(|()| *row),
                SheetWrite::AppendRow { values } => self.store.append_row(&self.config.orders, values),
            };
            match result {
                Ok(row) => landed.push((index, row)),
                Err(source) => return Err(self.compensate(&written, ledger, &landed, source)),
            }
        }

        Ok(())
    }

    /// Undo landed writes in reverse. `landed` pairs a ledger write index with
    /// the data row it reached.
    fn compensate(
        &self,
        stock: &[&StockChange],
        ledger: Option<&LedgerChange>,
        landed: &[(usize, usize)],
        source: StoreError,
    ) -> ReconcileError {
        let mut failed = 0;

        for &(index, row) in landed.iter().rev() {
            let revert = ledger.and_then(|change| change.revert(index, row));
            let result = match &revert {
                Some(write) => self.store.apply(&self.config.orders, write),
                None => Err(StoreError::Unavailable(format!("no undo staged for order write {index}"))),
            };
            if let Err(err) = result {
                failed += 1;
                error!(row, error = %err, "order row compensation failed");
            }
        }

        for change in stock.iter().rev() {
            if let Err(err) = self.store.apply(&self.config.inventory, &change.undo()) {
                failed += 1;
                error!(item_id = %change.item_id, before = change.before, error = %err, "stock compensation failed");
            }
        }

        let applied = stock.len() + landed.len();
        let rolled_back = failed == 0;
        if rolled_back {
            warn!(applied, error = %source, "commit failed; landed writes rolled back");
        } else {
            error!(applied, failed, error = %source, "commit uncertain; sheets need manual review");
        }

        ReconcileError::CommitUncertain {
            applied,
            rolled_back,
            source,
        }
    }

    /// Best effort: the sheets are already committed, so a failed publish
    /// is logged and not reported to the caller.
    fn publish(&self, order: &Order, events: Vec<OrderEvent>) {
        for event in events {
            let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
            let envelope = EventEnvelope::new(order.id().to_string(), AGGREGATE_TYPE, sequence, event);
            if let Err(err) = self.bus.publish(envelope) {
                warn!(order_id = %order.id(), error = ?err, "order event not published");
            }
        }
    }
}

fn item_keys<'a>(ids: impl IntoIterator<Item = &'a ItemId>) -> BTreeSet<ScopeKey> {
    ids.into_iter().cloned().map(ScopeKey::Item).collect()
}

fn ledger_error(order_id: &OrderId, err: LedgerError) -> ReconcileError {
    match err {
        LedgerError::NotFound(id) => ReconcileError::OrderNotFound(id),
        LedgerError::Malformed { order_id, reason } => ReconcileError::MalformedLedger { order_id, reason },
        LedgerError::Duplicate(id) => ReconcileError::Validation(format!("order id {id} already exists")),
        LedgerError::Rejected(domain) => ReconcileError::from_domain(order_id, domain),
        LedgerError::Schema(schema) => ReconcileError::Schema(schema),
    }
}

/// Pick the single best candidate for `query`.
fn resolve_item<'a>(inventory: &'a InventoryView, query: &str) -> Result<&'a InventoryItem, IssueKind> {
    let candidates = inventory.find_by_name(query);
    let Some(top) = candidates.first() else {
        return Err(IssueKind::ProductNotFound);
    };

    let tied: Vec<String> = candidates
        .iter()
        .take_while(|c| c.score.ties_with(&top.score))
        .map(|c| c.item.name().to_string())
        .collect();
    if tied.len() > 1 {
        return Err(IssueKind::AmbiguousProduct { candidates: tied });
    }

    Ok(top.item)
}

/// Resolve every requested line, collecting all per-line issues.
fn resolve_lines(inventory: &InventoryView, requested: &[LineRequest]) -> Result<Vec<ResolvedLine>, ReconcileError> {
    if requested.is_empty() {
        return Err(ReconcileError::Validation("an order needs at least one line".into()));
    }

    let mut resolved = Vec::with_capacity(requested.len());
    let mut issues = Vec::new();

    for (index, request) in requested.iter().enumerate() {
        let issue = |kind| LineIssue {
            line: index + 1,
            query: request.product.clone(),
            kind,
        };

        let quantity = match u32::try_from(request.quantity) {
            Ok(q) if q > 0 => q,
            _ => {
                issues.push(issue(IssueKind::InvalidQuantity {
                    quantity: request.quantity,
                }));
                continue;
            }
        };

        let item = match resolve_item(inventory, &request.product) {
            Ok(item) => item,
            Err(kind) => {
                issues.push(issue(kind));
                continue;
            }
        };

        if !item.is_sellable() {
            issues.push(issue(IssueKind::Unavailable {
                item_id: item.id().clone(),
                status: item.status().unwrap_or_default().to_string(),
            }));
            continue;
        }

        resolved.push(ResolvedLine {
            index,
            query: request.product.clone(),
            item_id: item.id().clone(),
            line: OrderLine::new(item.id().clone(), item.name(), quantity)
                .with_unit_price(item.price())
                .with_attributes(item.attributes().clone()),
        });
    }

    if issues.is_empty() {
        Ok(resolved)
    } else {
        debug!(issues = issues.len(), "order lines rejected");
        Err(ReconcileError::Rejected(issues))
    }
}

/// Stock an existing order holds, per line, as credits.
///
/// Lines read back without a product id are matched by exact name. A line
/// whose item has left the inventory sheet cannot be credited and is skipped.
fn consumed_items(inventory: &InventoryView, order: &Order) -> Vec<(ItemId, i64)> {
    order
        .lines()
        .iter()
        .filter_map(|line| {
            let id = line
                .item_id
                .as_ref()
                .filter(|id| inventory.get(id).is_some())
                .cloned()
                .or_else(|| exact_match(inventory, &line.product_name));
            if id.is_none() {
                warn!(
                    order_id = %order.id(),
                    product = %line.product_name,
                    "ordered item no longer in inventory; its stock is not credited"
                );
            }
            id.map(|id| (id, i64::from(line.quantity)))
        })
        .collect()
}

fn exact_match(inventory: &InventoryView, name: &str) -> Option<ItemId> {
    let candidates = inventory.find_by_name(name);
    let mut exact = candidates.iter().filter(|c| c.score.tier == MatchTier::Exact);
    match (exact.next(), exact.next()) {
        (Some(only), None) => Some(only.item.id().clone()),
        _ => None,
    }
}

/// Turn plan failures into per-line issues.
///
/// `credits` is what the order already held of each item (updates), added
/// back so the figures read as "asked for N, N' available to this order".
fn stock_rejection(errors: Vec<StockError>, lines: &[ResolvedLine], credits: &HashMap<ItemId, i64>) -> ReconcileError {
    let issues = errors
        .into_iter()
        .map(|err| {
            let item_id = match &err {
                StockError::UnknownItem(id) | StockError::Overflow(id) => id.clone(),
                StockError::InsufficientStock { item_id, .. } => item_id.clone(),
            };
            let line = lines.iter().find(|l| l.item_id == item_id);
            let kind = match err {
                StockError::InsufficientStock {
                    item_id,
                    requested,
                    available,
                } => {
                    let credit = credits.get(&item_id).copied().unwrap_or(0);
                    IssueKind::InsufficientStock {
                        item_id,
                        requested: requested.saturating_add(credit),
                        available: available.saturating_add(credit),
                    }
                }
                StockError::UnknownItem(_) => IssueKind::ProductNotFound,
                StockError::Overflow(_) => IssueKind::InvalidQuantity {
                    quantity: line.map(|l| i64::from(l.line.quantity)).unwrap_or(0),
                },
            };
            LineIssue {
                line: line.map(|l| l.index + 1).unwrap_or(0),
                query: line.map(|l| l.query.clone()).unwrap_or_else(|| item_id.to_string()),
                kind,
            }
        })
        .collect();

    ReconcileError::Rejected(issues)
}
