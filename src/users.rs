//! Users

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of an authenticated storefront user.
///
/// Authentication happens upstream; by the time a call reaches this crate the
/// session collaborator has already resolved the user, so this is just an
/// opaque id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user-{}", self.0)
    }
}
