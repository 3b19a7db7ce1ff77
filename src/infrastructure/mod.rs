//! Adapters for the domain ports: ledger storage backends and notification
//! channels.

pub mod in_memory;
pub mod mailer;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod smtp;
pub mod webhook;
