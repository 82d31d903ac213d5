//! Promotions
//!
//! A promotion is a time-windowed percentage discount identified by a code.
//! The directory is the lookup surface used at checkout; whether a promotion
//! is active is always evaluated against the caller's clock at the moment of
//! the call, never cached.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use decimal_percentage::Percentage;
use jiff::civil::Date;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors related to promotion construction or lookup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromotionError {
    /// The discount is outside 0–100 percent points.
    #[error("discount must be between 0 and 100 percent, got {0}")]
    InvalidDiscount(u8),

    /// The validity window ends before it starts.
    #[error("promotion window ends on {ends_on} before it starts on {starts_on}")]
    InvalidWindow {
        /// First day the promotion is valid.
        starts_on: Date,
        /// First day the promotion is no longer valid.
        ends_on: Date,
    },

    /// A promotion with this code already exists.
    #[error("a promotion with code {0:?} already exists")]
    Duplicate(String),

    /// No promotion with this code exists.
    #[error("no promotion with code {0:?}")]
    NotFound(String),
}

/// A percentage discount valid over a half-open window of dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    code: String,
    discount: u8,
    starts_on: Date,
    ends_on: Date,
    sent: bool,
}

impl Promotion {
    /// Create a promotion.
    ///
    /// # Errors
    ///
    /// - [`PromotionError::InvalidDiscount`] if `discount` exceeds 100.
    /// - [`PromotionError::InvalidWindow`] if `ends_on` precedes `starts_on`.
    pub fn new(
        code: impl Into<String>,
        discount: u8,
        starts_on: Date,
        ends_on: Date,
    ) -> Result<Self, PromotionError> {
        if discount > 100 {
            return Err(PromotionError::InvalidDiscount(discount));
        }

        if ends_on < starts_on {
            return Err(PromotionError::InvalidWindow { starts_on, ends_on });
        }

        Ok(Promotion {
            code: code.into(),
            discount,
            starts_on,
            ends_on,
            sent: false,
        })
    }

    /// The promotion code. Case-sensitive.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The discount in whole percent points (0–100).
    #[must_use]
    pub fn discount(&self) -> u8 {
        self.discount
    }

    /// The discount as a fraction, for price arithmetic.
    #[must_use]
    pub fn discount_fraction(&self) -> Percentage {
        Percentage::from(Decimal::from(self.discount) / Decimal::ONE_HUNDRED)
    }

    /// Whether the promotion is active on the given day.
    ///
    /// The window is half-open: active on `starts_on`, no longer active on
    /// `ends_on`.
    #[must_use]
    pub fn is_active(&self, today: Date) -> bool {
        self.starts_on <= today && today < self.ends_on
    }

    /// Whether the notification collaborator has already sent this promotion.
    #[must_use]
    pub fn sent(&self) -> bool {
        self.sent
    }
}

/// Lookup of promotions by code.
#[derive(Debug, Default)]
pub struct PromotionDirectory {
    inner: RwLock<FxHashMap<String, Promotion>>,
}

impl PromotionDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a promotion.
    ///
    /// # Errors
    ///
    /// Returns [`PromotionError::Duplicate`] if a promotion with the same
    /// code is already registered.
    pub fn insert(&self, promotion: Promotion) -> Result<(), PromotionError> {
        let mut inner = self.write();

        if inner.contains_key(promotion.code()) {
            return Err(PromotionError::Duplicate(promotion.code().to_owned()));
        }

        inner.insert(promotion.code().to_owned(), promotion);

        Ok(())
    }

    /// Look up a promotion by its exact code.
    #[must_use]
    pub fn lookup(&self, code: &str) -> Option<Promotion> {
        self.read().get(code).cloned()
    }

    /// Whether the promotion with this code is active on the given day.
    ///
    /// Unknown codes are simply inactive.
    #[must_use]
    pub fn is_active(&self, code: &str, today: Date) -> bool {
        self.read()
            .get(code)
            .is_some_and(|promotion| promotion.is_active(today))
    }

    /// Flip a promotion's one-way `sent` flag. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`PromotionError::NotFound`] if no promotion has this code.
    pub fn mark_sent(&self, code: &str) -> Result<(), PromotionError> {
        let mut inner = self.write();
        let promotion = inner
            .get_mut(code)
            .ok_or_else(|| PromotionError::NotFound(code.to_owned()))?;

        promotion.sent = true;

        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, FxHashMap<String, Promotion>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, FxHashMap<String, Promotion>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use jiff::civil::date;
    use testresult::TestResult;

    use super::*;

    fn january_promo() -> Promotion {
        match Promotion::new("JAN10", 10, date(2024, 1, 1), date(2024, 2, 1)) {
            Ok(promo) => promo,
            Err(err) => panic!("fixture promotion is valid: {err}"),
        }
    }

    #[test]
    fn discount_over_100_is_rejected() {
        let result = Promotion::new("BIG", 101, date(2024, 1, 1), date(2024, 2, 1));

        assert_eq!(result, Err(PromotionError::InvalidDiscount(101)));
    }

    #[test]
    fn inverted_window_is_rejected() {
        let result = Promotion::new("BAD", 10, date(2024, 2, 1), date(2024, 1, 1));

        assert!(matches!(result, Err(PromotionError::InvalidWindow { .. })));
    }

    #[test]
    fn window_is_half_open() {
        let promo = january_promo();

        assert!(promo.is_active(date(2024, 1, 1)));
        assert!(promo.is_active(date(2024, 1, 31)));
        assert!(!promo.is_active(date(2024, 2, 1)));
        assert!(!promo.is_active(date(2023, 12, 31)));
    }

    #[test]
    fn discount_fraction_is_exact() {
        let promo = january_promo();

        assert_eq!(
            promo.discount_fraction() * Decimal::ONE_HUNDRED,
            Decimal::from(10u8)
        );
    }

    #[test]
    fn duplicate_codes_are_rejected() -> TestResult {
        let directory = PromotionDirectory::new();
        directory.insert(january_promo())?;

        let result = directory.insert(january_promo());

        assert_eq!(result, Err(PromotionError::Duplicate("JAN10".to_owned())));

        Ok(())
    }

    #[test]
    fn lookup_is_case_sensitive() -> TestResult {
        let directory = PromotionDirectory::new();
        directory.insert(january_promo())?;

        assert!(directory.lookup("JAN10").is_some());
        assert!(directory.lookup("jan10").is_none());

        Ok(())
    }

    #[test]
    fn is_active_checks_window_per_call() -> TestResult {
        let directory = PromotionDirectory::new();
        directory.insert(january_promo())?;

        assert!(directory.is_active("JAN10", date(2024, 1, 31)));
        assert!(!directory.is_active("JAN10", date(2024, 2, 1)));
        assert!(!directory.is_active("MISSING", date(2024, 1, 31)));

        Ok(())
    }

    #[test]
    fn mark_sent_is_one_way_and_idempotent() -> TestResult {
        let directory = PromotionDirectory::new();
        directory.insert(january_promo())?;

        directory.mark_sent("JAN10")?;
        directory.mark_sent("JAN10")?;

        assert!(
            directory.lookup("JAN10").is_some_and(|promo| promo.sent()),
            "sent flag should stick"
        );

        Ok(())
    }

    #[test]
    fn mark_sent_unknown_code_errors() {
        let directory = PromotionDirectory::new();

        let result = directory.mark_sent("NOPE");

        assert_eq!(result, Err(PromotionError::NotFound("NOPE".to_owned())));
    }
}
