//! Orders
//!
//! An order is an immutable record of a completed purchase: once the ledger
//! has created it, its lines, promotion snapshot and total never change.
//! Only the lifecycle state advances, and only forward.

use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use jiff::Timestamp;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use slotmap::{Key, SlotMap, new_key_type};
use smallvec::SmallVec;
use thiserror::Error;

use crate::{books::BookKey, checkout::ShippingAddress, users::UserId};

new_key_type! {
    /// Order Key
    pub struct OrderKey;
}

impl fmt::Display for OrderKey {
    /// The ledger never frees slots, so the slot index alone is unique.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order-{}", self.data().as_ffi() & 0xFFFF_FFFF)
    }
}

/// Errors related to ledger lookups and state transitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    /// No order exists with this key.
    #[error("no order with key {0}")]
    NotFound(OrderKey),

    /// The order cannot advance from its current state.
    #[error("order {order} cannot advance from {from}")]
    InvalidTransition {
        /// The order that was asked to advance.
        order: OrderKey,
        /// Its current, terminal-for-this-call state.
        from: OrderState,
    },
}

/// Lifecycle state of an order.
///
/// Transitions are linear: `Processing` to `Shipped` to `Delivered`, with no
/// backward moves and no skipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    /// Initial state of every freshly placed order.
    Processing,

    /// The order has left the warehouse.
    Shipped,

    /// Terminal state.
    Delivered,
}

impl OrderState {
    /// The next state in the lifecycle, or `None` from `Delivered`.
    #[must_use]
    pub fn next(self) -> Option<OrderState> {
        match self {
            OrderState::Processing => Some(OrderState::Shipped),
            OrderState::Shipped => Some(OrderState::Delivered),
            OrderState::Delivered => None,
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderState::Processing => write!(f, "processing"),
            OrderState::Shipped => write!(f, "shipped"),
            OrderState::Delivered => write!(f, "delivered"),
        }
    }
}

/// One purchased line: the book with its quantity and the unit price frozen
/// at checkout time, independent of later catalog price changes.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderLine {
    /// The purchased book.
    pub book: BookKey,

    /// Title snapshot, for receipts.
    pub title: String,

    /// ISBN snapshot, for receipts.
    pub isbn: String,

    /// Number of copies purchased.
    pub quantity: u32,

    /// Unit price at checkout time.
    pub unit_price: Decimal,
}

/// Snapshot of the promotion applied to an order - the discount value, not a
/// live reference into the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedPromotion {
    /// The code the buyer supplied.
    pub code: String,

    /// Discount in whole percent points at the time of checkout.
    pub discount: u8,
}

/// An immutable record of a completed purchase.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    /// Ledger-assigned id. Set by [`OrderLedger::create`].
    pub id: OrderKey,

    /// The buying user.
    pub user: UserId,

    /// Purchased lines with frozen unit prices.
    pub lines: SmallVec<[OrderLine; 8]>,

    /// Promotion snapshot, if a code was applied.
    pub promotion: Option<AppliedPromotion>,

    /// Opaque reference to the buyer's payment method.
    pub payment_ref: String,

    /// Shipping address snapshot.
    pub shipping_address: ShippingAddress,

    /// When the order was placed.
    pub placed_at: Timestamp,

    /// Pre-discount subtotal from the cart snapshot.
    pub subtotal: Decimal,

    /// Final charged total: discounted subtotal plus tax and shipping.
    pub total: Decimal,

    /// Lifecycle state. The only field that ever changes after creation.
    pub state: OrderState,
}

struct LedgerInner {
    orders: SlotMap<OrderKey, Order>,
    by_user: FxHashMap<UserId, Vec<OrderKey>>,
}

/// Append-only store of orders.
pub struct OrderLedger {
    inner: RwLock<LedgerInner>,
}

impl fmt::Debug for OrderLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderLedger").finish_non_exhaustive()
    }
}

impl Default for OrderLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        OrderLedger {
            inner: RwLock::new(LedgerInner {
                orders: SlotMap::with_key(),
                by_user: FxHashMap::default(),
            }),
        }
    }

    /// Append an order, assigning and returning its key.
    ///
    /// The key is also written into the stored order's `id` field.
    pub fn create(&self, order: Order) -> OrderKey {
        let user = order.user;
        let mut inner = self.write();

        let key = inner.orders.insert_with_key(|key| Order { id: key, ..order });
        inner.by_user.entry(user).or_default().push(key);

        key
    }

    /// Advance an order one step along its lifecycle, returning the new state.
    ///
    /// # Errors
    ///
    /// - [`OrderError::NotFound`] if no order has this key.
    /// - [`OrderError::InvalidTransition`] if the order is already delivered.
    pub fn advance(&self, key: OrderKey) -> Result<OrderState, OrderError> {
        let mut inner = self.write();
        let order = inner.orders.get_mut(key).ok_or(OrderError::NotFound(key))?;

        let next = order.state.next().ok_or(OrderError::InvalidTransition {
            order: key,
            from: order.state,
        })?;

        order.state = next;

        Ok(next)
    }

    /// Fetch a copy of an order.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::NotFound`] if no order has this key.
    pub fn get(&self, key: OrderKey) -> Result<Order, OrderError> {
        self.read()
            .orders
            .get(key)
            .cloned()
            .ok_or(OrderError::NotFound(key))
    }

    /// All of a user's orders, oldest first.
    #[must_use]
    pub fn list_for_user(&self, user: UserId) -> Vec<Order> {
        let inner = self.read();

        inner
            .by_user
            .get(&user)
            .into_iter()
            .flatten()
            .filter_map(|key| inner.orders.get(*key).cloned())
            .collect()
    }

    /// Number of orders ever placed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().orders.len()
    }

    /// Check if no orders have been placed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().orders.is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, LedgerInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use smallvec::smallvec;
    use testresult::TestResult;

    use super::*;

    fn order_for(user: UserId) -> Order {
        Order {
            id: OrderKey::default(),
            user,
            lines: smallvec![OrderLine {
                book: BookKey::default(),
                title: "Dune".to_owned(),
                isbn: "9780441172719".to_owned(),
                quantity: 1,
                unit_price: Decimal::new(999, 2),
            }],
            promotion: None,
            payment_ref: "card-1".to_owned(),
            shipping_address: ShippingAddress {
                street_1: "1 Main St".to_owned(),
                street_2: None,
                city: "Springfield".to_owned(),
                state: "IL".to_owned(),
                zip_code: "62701".to_owned(),
            },
            placed_at: Timestamp::UNIX_EPOCH,
            subtotal: Decimal::new(999, 2),
            total: Decimal::new(1468, 2),
            state: OrderState::Processing,
        }
    }

    #[test]
    fn create_assigns_the_key_into_the_order() -> TestResult {
        let ledger = OrderLedger::new();

        let key = ledger.create(order_for(UserId(1)));
        let stored = ledger.get(key)?;

        assert_eq!(stored.id, key);
        assert_eq!(stored.state, OrderState::Processing);

        Ok(())
    }

    #[test]
    fn keys_render_as_plain_order_numbers() {
        let ledger = OrderLedger::new();

        let first = ledger.create(order_for(UserId(1)));
        let second = ledger.create(order_for(UserId(2)));

        assert!(first.to_string().starts_with("order-"), "got {first}");
        assert_ne!(first.to_string(), second.to_string());
    }

    #[test]
    fn advance_walks_the_lifecycle_in_order() -> TestResult {
        let ledger = OrderLedger::new();
        let key = ledger.create(order_for(UserId(1)));

        assert_eq!(ledger.advance(key)?, OrderState::Shipped);
        assert_eq!(ledger.advance(key)?, OrderState::Delivered);

        Ok(())
    }

    #[test]
    fn advance_past_delivered_fails() -> TestResult {
        let ledger = OrderLedger::new();
        let key = ledger.create(order_for(UserId(1)));
        ledger.advance(key)?;
        ledger.advance(key)?;

        let result = ledger.advance(key);

        assert_eq!(
            result,
            Err(OrderError::InvalidTransition {
                order: key,
                from: OrderState::Delivered,
            })
        );
        assert_eq!(ledger.get(key)?.state, OrderState::Delivered);

        Ok(())
    }

    #[test]
    fn advance_unknown_order_fails() {
        let ledger = OrderLedger::new();
        let key = OrderKey::default();

        assert_eq!(ledger.advance(key), Err(OrderError::NotFound(key)));
    }

    #[test]
    fn list_for_user_is_in_insertion_order() -> TestResult {
        let ledger = OrderLedger::new();
        let alice = UserId(1);
        let bob = UserId(2);

        let first = ledger.create(order_for(alice));
        ledger.create(order_for(bob));
        let second = ledger.create(order_for(alice));

        let orders = ledger.list_for_user(alice);
        let keys: Vec<OrderKey> = orders.iter().map(|order| order.id).collect();

        assert_eq!(keys, vec![first, second]);
        assert!(ledger.list_for_user(UserId(99)).is_empty());

        Ok(())
    }

    #[test]
    fn advancing_never_touches_the_snapshot() -> TestResult {
        let ledger = OrderLedger::new();
        let key = ledger.create(order_for(UserId(1)));
        let before = ledger.get(key)?;

        ledger.advance(key)?;
        let after = ledger.get(key)?;

        assert_eq!(after.total, before.total);
        assert_eq!(after.lines, before.lines);
        assert_eq!(after.placed_at, before.placed_at);

        Ok(())
    }
}
