//! Tome prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    books::{Book, BookKey, Catalog, InventoryError},
    cart::{Cart, CartError, CartLine, CartSnapshot, Carts},
    checkout::{
        CheckoutEngine, CheckoutError, Clock, FixedClock, PaymentMethod, ShippingAddress,
        SystemClock,
    },
    orders::{
        AppliedPromotion, Order, OrderError, OrderKey, OrderLedger, OrderLine, OrderState,
    },
    pricing::{PricingConfig, order_total},
    promotions::{Promotion, PromotionDirectory, PromotionError},
    receipt::{Receipt, ReceiptError},
    users::UserId,
};
