//! Database module: entity models and SQL repositories.
//!
//! - `model`: typed rows and insert payloads returned/consumed by queries.
//! - `repo`: SQL-only functions that map rows into entities. Functions with
//!   a `_tx` suffix run inside a caller-owned transaction so the batch
//!   coordinator can make a whole return file atomic.

pub mod model;
pub mod repo;

pub use model::{MailPayment, NewPayment, PaymentRow};
pub use repo::*;
