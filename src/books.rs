//! Books and the catalog.
//!
//! The catalog is read-mostly: book records are created and edited by admin
//! tooling, while checkout only reads prices and decrements stock. Stock
//! counts live in per-book cells so that checkouts touching disjoint books
//! never contend with each other.

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rust_decimal::Decimal;
use slotmap::{SecondaryMap, SlotMap, new_key_type};
use thiserror::Error;

new_key_type! {
    /// Book Key
    pub struct BookKey;
}

/// Errors raised while reading or committing stock.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InventoryError {
    /// The book does not exist in the catalog.
    #[error("book {0:?} is not in the catalog")]
    UnknownBook(BookKey),

    /// A requested quantity exceeds the currently available stock.
    #[error("only {available} of the {requested} requested copies of {title:?} are available")]
    Insufficient {
        /// The book that fell short.
        book: BookKey,
        /// Title of the book, for caller-facing messages.
        title: String,
        /// Quantity the caller asked for.
        requested: u32,
        /// Quantity actually available at commit time.
        available: u32,
    },
}

/// A book record as kept by the catalog-management collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    /// Title
    pub title: String,

    /// ISBN, carried through to order lines and receipts.
    pub isbn: String,

    /// Unit price. Non-negative, two-decimal currency value.
    pub price: Decimal,
}

struct CatalogInner {
    books: SlotMap<BookKey, Book>,
    stock: SecondaryMap<BookKey, Mutex<u32>>,
}

/// The store of books and their sellable stock.
///
/// Interior-mutable so a single catalog can be shared (`Arc`) between admin
/// tooling, carts and concurrent checkouts.
pub struct Catalog {
    inner: RwLock<CatalogInner>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog").finish_non_exhaustive()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Catalog {
            inner: RwLock::new(CatalogInner {
                books: SlotMap::with_key(),
                stock: SecondaryMap::new(),
            }),
        }
    }

    /// Add a book with an initial stock count, returning its key.
    pub fn add_book(&self, book: Book, stock: u32) -> BookKey {
        let mut inner = self.write();
        let key = inner.books.insert(book);
        inner.stock.insert(key, Mutex::new(stock));

        key
    }

    /// Fetch a copy of a book record.
    #[must_use]
    pub fn book(&self, key: BookKey) -> Option<Book> {
        self.read().books.get(key).cloned()
    }

    /// Current unit price of a book.
    #[must_use]
    pub fn price(&self, key: BookKey) -> Option<Decimal> {
        self.read().books.get(key).map(|book| book.price)
    }

    /// Update a book's unit price. Already-placed orders and already-added
    /// cart lines keep the price they captured.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::UnknownBook`] if the book does not exist.
    pub fn set_price(&self, key: BookKey, price: Decimal) -> Result<(), InventoryError> {
        let mut inner = self.write();
        let book = inner
            .books
            .get_mut(key)
            .ok_or(InventoryError::UnknownBook(key))?;
        book.price = price;

        Ok(())
    }

    /// Currently available stock for a book.
    #[must_use]
    pub fn available(&self, key: BookKey) -> Option<u32> {
        let inner = self.read();

        inner.stock.get(key).map(|cell| *lock_cell(cell))
    }

    /// Raise a book's stock count.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::UnknownBook`] if the book does not exist.
    pub fn restock(&self, key: BookKey, quantity: u32) -> Result<(), InventoryError> {
        let inner = self.read();
        let cell = inner
            .stock
            .get(key)
            .ok_or(InventoryError::UnknownBook(key))?;

        let mut count = lock_cell(cell);
        *count = count.saturating_add(quantity);

        Ok(())
    }

    /// Atomically commit a multi-book stock decrement.
    ///
    /// Every requested quantity is validated against current stock while the
    /// touched cells are locked, and only then are the decrements applied, so
    /// the commit is all-or-nothing across the whole request set. Cells are
    /// locked in ascending key order; checkouts over overlapping books
    /// serialize on those books only.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::UnknownBook`] if any requested book does not exist.
    /// - [`InventoryError::Insufficient`] if any requested quantity exceeds
    ///   the available stock. In both cases no stock cell is modified.
    pub fn take_stock(&self, requests: &[(BookKey, u32)]) -> Result<(), InventoryError> {
        let inner = self.read();
        let requests = coalesced(requests);

        let mut cells: Vec<(u32, MutexGuard<'_, u32>)> = Vec::with_capacity(requests.len());

        for (key, requested) in requests {
            let cell = inner
                .stock
                .get(key)
                .ok_or(InventoryError::UnknownBook(key))?;
            let count = lock_cell(cell);

            if requested > *count {
                return Err(InventoryError::Insufficient {
                    book: key,
                    title: inner
                        .books
                        .get(key)
                        .map(|book| book.title.clone())
                        .unwrap_or_default(),
                    requested,
                    available: *count,
                });
            }

            cells.push((requested, count));
        }

        for (requested, count) in &mut cells {
            **count -= *requested;
        }

        Ok(())
    }

    /// Number of books in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().books.len()
    }

    /// Check if the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().books.is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, CatalogInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CatalogInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Sort requests into lock order and merge entries for the same book.
fn coalesced(requests: &[(BookKey, u32)]) -> Vec<(BookKey, u32)> {
    let mut sorted = requests.to_vec();
    sorted.sort_unstable_by_key(|&(key, _)| key);

    let mut merged: Vec<(BookKey, u32)> = Vec::with_capacity(sorted.len());
    for (key, quantity) in sorted {
        match merged.last_mut() {
            Some((last, total)) if *last == key => *total = total.saturating_add(quantity),
            _ => merged.push((key, quantity)),
        }
    }

    merged
}

/// A stock cell holder can only panic mid-read or mid-store of a `u32`, which
/// cannot leave the count torn, so a poisoned lock is safe to recover.
fn lock_cell(cell: &Mutex<u32>) -> MutexGuard<'_, u32> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn book(title: &str, minor: i64) -> Book {
        Book {
            title: title.to_owned(),
            isbn: "9780000000000".to_owned(),
            price: Decimal::new(minor, 2),
        }
    }

    #[test]
    fn add_book_tracks_stock() {
        let catalog = Catalog::new();

        let key = catalog.add_book(book("Dune", 1299), 4);

        assert_eq!(catalog.available(key), Some(4));
        assert_eq!(catalog.price(key), Some(Decimal::new(1299, 2)));
    }

    #[test]
    fn take_stock_decrements_every_line() {
        let catalog = Catalog::new();
        let a = catalog.add_book(book("A", 100), 5);
        let b = catalog.add_book(book("B", 200), 2);

        let result = catalog.take_stock(&[(a, 3), (b, 2)]);

        assert!(result.is_ok(), "expected commit to succeed: {result:?}");
        assert_eq!(catalog.available(a), Some(2));
        assert_eq!(catalog.available(b), Some(0));
    }

    #[test]
    fn take_stock_shortfall_leaves_everything_untouched() {
        let catalog = Catalog::new();
        let a = catalog.add_book(book("A", 100), 3);
        let b = catalog.add_book(book("B", 200), 10);

        let err = catalog.take_stock(&[(a, 5), (b, 1)]);

        assert_eq!(
            err,
            Err(InventoryError::Insufficient {
                book: a,
                title: "A".to_owned(),
                requested: 5,
                available: 3,
            })
        );
        assert_eq!(catalog.available(a), Some(3));
        assert_eq!(catalog.available(b), Some(10));
    }

    #[test]
    fn take_stock_unknown_book_errors() {
        let catalog = Catalog::new();
        let known = catalog.add_book(book("A", 100), 1);
        let unknown = BookKey::default();

        let err = catalog.take_stock(&[(known, 1), (unknown, 1)]);

        assert_eq!(err, Err(InventoryError::UnknownBook(unknown)));
        assert_eq!(catalog.available(known), Some(1));
    }

    #[test]
    fn take_stock_merges_duplicate_requests() {
        let catalog = Catalog::new();
        let a = catalog.add_book(book("A", 100), 5);

        let result = catalog.take_stock(&[(a, 2), (a, 2)]);

        assert!(result.is_ok(), "expected merged commit to succeed");
        assert_eq!(catalog.available(a), Some(1));
    }

    #[test]
    fn restock_raises_available() {
        let catalog = Catalog::new();
        let a = catalog.add_book(book("A", 100), 1);

        catalog.restock(a, 9).ok();

        assert_eq!(catalog.available(a), Some(10));
    }

    #[test]
    fn set_price_changes_current_price_only() {
        let catalog = Catalog::new();
        let a = catalog.add_book(book("A", 100), 1);

        let before = catalog.price(a);
        catalog.set_price(a, Decimal::new(250, 2)).ok();

        assert_eq!(before, Some(Decimal::new(100, 2)));
        assert_eq!(catalog.price(a), Some(Decimal::new(250, 2)));
    }
}
