//! Orders Core - Data Types
//!
//! Order aggregate, payload decoding and the error enums shared by every
//! other crate in the workspace. No I/O happens here.

use chrono::{DateTime, Utc};

pub mod error;
pub mod order;

pub use error::{OrderError, OrderResult, StorageError, ValidationError};
pub use order::{Delivery, Item, Order, OrderUid, Payment};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;
