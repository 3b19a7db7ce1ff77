//! Batch entry points: catalog seeding and the CSV command/report formats.

pub mod catalog;
pub mod csv;
