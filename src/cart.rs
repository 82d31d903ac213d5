//! Carts
//!
//! A cart is the mutable pre-purchase basket belonging to exactly one user.
//! Lines are keyed by book so each book appears at most once, and the running
//! subtotal is adjusted on every mutation. Adding to a cart never reserves
//! stock; inventory is validated only at checkout.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use thiserror::Error;
use tracing::debug;

use crate::{
    books::{BookKey, Catalog},
    users::UserId,
};

/// Errors related to cart mutation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartError {
    /// An add was requested with a zero quantity delta.
    #[error("quantity delta must be at least 1")]
    InvalidQuantity,

    /// The book does not exist in the catalog.
    #[error("book {0:?} is not in the catalog")]
    UnknownBook(BookKey),

    /// No cart has been provisioned for this user.
    #[error("no cart exists for {0}")]
    UnknownUser(UserId),
}

/// One (book, quantity) pairing inside a cart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CartLine {
    /// The book this line is for.
    pub book: BookKey,

    /// Number of copies. Always at least 1; a line that would reach 0 is
    /// removed instead.
    pub quantity: u32,

    /// Unit price captured from the catalog when the line was created.
    pub unit_price: Decimal,
}

/// A user's basket of cart lines with a running subtotal.
#[derive(Debug, Clone, Default)]
pub struct Cart {
    lines: FxHashMap<BookKey, CartLine>,
    subtotal: Decimal,
}

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` copies of a book, creating the line if absent.
    ///
    /// The first add captures `unit_price`; later adds for the same book keep
    /// the line's captured price so the subtotal always equals the sum over
    /// lines of quantity times unit price.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidQuantity`] if `delta` is 0. The cart is
    /// left untouched on any error. Quantities saturate at `u32::MAX`.
    pub fn add(&mut self, book: BookKey, unit_price: Decimal, delta: u32) -> Result<(), CartError> {
        if delta == 0 {
            return Err(CartError::InvalidQuantity);
        }

        let line = self.lines.entry(book).or_insert(CartLine {
            book,
            quantity: 0,
            unit_price,
        });

        let quantity = line.quantity.saturating_add(delta);
        self.subtotal += Decimal::from(quantity - line.quantity) * line.unit_price;
        line.quantity = quantity;

        Ok(())
    }

    /// Set a line's quantity, adjusting the subtotal by the signed delta.
    ///
    /// A quantity of 0 removes the line. If no line exists for the book and
    /// the quantity is positive, a line is created at `unit_price`.
    pub fn set_quantity(&mut self, book: BookKey, unit_price: Decimal, quantity: u32) {
        match self.lines.get_mut(&book) {
            Some(line) if quantity == 0 => {
                self.subtotal -= Decimal::from(line.quantity) * line.unit_price;
                self.lines.remove(&book);
            }
            Some(line) => {
                let delta = Decimal::from(quantity) - Decimal::from(line.quantity);
                self.subtotal += delta * line.unit_price;
                line.quantity = quantity;
            }
            None if quantity > 0 => {
                self.lines.insert(
                    book,
                    CartLine {
                        book,
                        quantity,
                        unit_price,
                    },
                );
                self.subtotal += Decimal::from(quantity) * unit_price;
            }
            None => {}
        }
    }

    /// Remove a book's line entirely.
    pub fn remove(&mut self, book: BookKey) {
        self.set_quantity(book, Decimal::ZERO, 0);
    }

    /// Remove all lines and reset the subtotal.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.subtotal = Decimal::ZERO;
    }

    /// Produce an immutable point-in-time copy for handoff to checkout.
    ///
    /// Mutations after the snapshot is taken never affect the snapshot.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        CartSnapshot {
            lines: self.lines.values().copied().collect(),
            subtotal: self.subtotal,
        }
    }

    /// Current running subtotal.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.subtotal
    }

    /// Quantity of a book in the cart, if present.
    #[must_use]
    pub fn quantity(&self, book: BookKey) -> Option<u32> {
        self.lines.get(&book).map(|line| line.quantity)
    }

    /// Iterate over the cart's lines.
    pub fn lines(&self) -> impl Iterator<Item = &CartLine> {
        self.lines.values()
    }

    /// Number of distinct books in the cart.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Check if the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// An immutable point-in-time copy of a cart.
#[derive(Debug, Clone)]
pub struct CartSnapshot {
    lines: SmallVec<[CartLine; 8]>,
    subtotal: Decimal,
}

impl CartSnapshot {
    /// The frozen cart lines.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// The frozen subtotal.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.subtotal
    }

    /// Check if the snapshot has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The (book, quantity) pairs to commit against catalog stock.
    #[must_use]
    pub fn stock_requests(&self) -> SmallVec<[(BookKey, u32); 8]> {
        self.lines
            .iter()
            .map(|line| (line.book, line.quantity))
            .collect()
    }
}

/// The per-user store of open carts.
///
/// Exactly one open cart exists per user at a time: one is provisioned with
/// the account and replaced with a fresh empty one after each successful
/// checkout. Prices for new lines are resolved from the injected catalog.
#[derive(Debug)]
pub struct Carts {
    catalog: Arc<Catalog>,
    inner: RwLock<FxHashMap<UserId, Cart>>,
}

impl Carts {
    /// Create a cart store backed by the given catalog.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Carts {
            catalog,
            inner: RwLock::new(FxHashMap::default()),
        }
    }

    /// Create an empty cart for a newly provisioned user account.
    ///
    /// A user who already has a cart keeps it.
    pub fn provision(&self, user: UserId) {
        self.write().entry(user).or_default();
    }

    /// Install a fresh empty cart for the user, discarding the current one.
    ///
    /// Called by the checkout engine after a successful checkout.
    pub fn replace(&self, user: UserId) {
        debug!(%user, "replacing cart");
        self.write().insert(user, Cart::new());
    }

    /// Add `delta` copies of a book to the user's cart at the catalog's
    /// current price.
    ///
    /// # Errors
    ///
    /// - [`CartError::UnknownBook`] if the book is not in the catalog.
    /// - [`CartError::UnknownUser`] if the user has no cart.
    /// - [`CartError::InvalidQuantity`] if `delta` is 0.
    pub fn add(&self, user: UserId, book: BookKey, delta: u32) -> Result<(), CartError> {
        let price = self.catalog.price(book).ok_or(CartError::UnknownBook(book))?;

        let mut inner = self.write();
        let cart = inner.get_mut(&user).ok_or(CartError::UnknownUser(user))?;

        cart.add(book, price, delta)
    }

    /// Set the quantity of a book in the user's cart.
    ///
    /// # Errors
    ///
    /// - [`CartError::UnknownBook`] if the book is not in the catalog.
    /// - [`CartError::UnknownUser`] if the user has no cart.
    pub fn set_quantity(&self, user: UserId, book: BookKey, quantity: u32) -> Result<(), CartError> {
        let price = self.catalog.price(book).ok_or(CartError::UnknownBook(book))?;

        let mut inner = self.write();
        let cart = inner.get_mut(&user).ok_or(CartError::UnknownUser(user))?;

        cart.set_quantity(book, price, quantity);

        Ok(())
    }

    /// Remove a book from the user's cart.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::UnknownUser`] if the user has no cart.
    pub fn remove(&self, user: UserId, book: BookKey) -> Result<(), CartError> {
        let mut inner = self.write();
        let cart = inner.get_mut(&user).ok_or(CartError::UnknownUser(user))?;

        cart.remove(book);

        Ok(())
    }

    /// Take an immutable snapshot of the user's cart.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::UnknownUser`] if the user has no cart.
    pub fn snapshot(&self, user: UserId) -> Result<CartSnapshot, CartError> {
        self.read()
            .get(&user)
            .map(Cart::snapshot)
            .ok_or(CartError::UnknownUser(user))
    }

    /// Current subtotal of the user's cart.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::UnknownUser`] if the user has no cart.
    pub fn subtotal(&self, user: UserId) -> Result<Decimal, CartError> {
        self.read()
            .get(&user)
            .map(Cart::subtotal)
            .ok_or(CartError::UnknownUser(user))
    }

    fn read(&self) -> RwLockReadGuard<'_, FxHashMap<UserId, Cart>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, FxHashMap<UserId, Cart>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
