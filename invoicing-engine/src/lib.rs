//! Invoicing engine - atomic invoice posting, invoice ledger and store backups.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod startup;
