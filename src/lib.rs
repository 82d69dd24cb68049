//! Per-user point balances with an append-only transaction history.
//!
//! [`commands::DomainLogic`] is the entry point: it exposes charge, use, balance and history
//! operations, both as [`tower::Service`] implementations and as plain async methods, on top of
//! any [`ports::balance::BalanceStorePort`] and [`ports::history::HistoryStorePort`].

pub mod adapters;
pub mod commands;
pub mod config;
pub mod domain;
pub mod ports;
pub mod queries;

pub use commands::{DomainLogic, Error, ErrorKind};
pub use domain::{Balance, PointPolicy, Transaction, TransactionType, UserId};
