//! Tome
//!
//! Tome is the core of an online bookstore storefront: the catalog, carts,
//! promotions and the atomic cart-to-order checkout transaction.
//!
//! The interesting part is [`checkout::CheckoutEngine`], which converts a
//! mutable per-user [`cart::Cart`] into an immutable [`orders::Order`] while
//! enforcing inventory sufficiency, promotion validity and pricing
//! correctness under concurrent access. Everything around it (auth, HTML,
//! email delivery, payment networks) lives in external collaborators and
//! crosses into this crate only as plain values.

pub mod books;
pub mod cart;
pub mod checkout;
pub mod orders;
pub mod prelude;
pub mod pricing;
pub mod promotions;
pub mod receipt;
pub mod users;
