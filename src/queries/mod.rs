//! Read-side operations of the ledger
//!
//! Reads take the same per-user lock as mutations, so they never observe a balance whose
//! history record has not been appended yet.

pub mod get_balance;
pub mod get_history;
