//! # Repository Module
//!
//! One typed repository per entity, each returning domain values from
//! `medirun-core` instead of raw rows, plus the stock ledger which owns
//! every mutation of `stock_on_hand`.
//!
//! ## Status-Guarded Updates
//! Order, prescription and delivery status changes all use the same shape:
//! `UPDATE .. SET status = <next> WHERE id = ? AND status = <expected>`.
//! Zero rows affected means a concurrent writer got there first (or the
//! entity is missing); the caller decides how to surface that. This is what
//! serializes transitions per entity without any in-process locking.

pub mod cart;
pub mod delivery;
pub mod driver;
pub mod ledger;
pub mod medicine;
pub mod order;
pub mod prescription;
