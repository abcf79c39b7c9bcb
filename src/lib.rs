//! Tax Engine library crate.
//!
//! This crate exposes the tax computation engine, the remittance ledger
//! and the compliance scorer as reusable modules.  External
//! applications may depend on the `tax_engine` crate and call into
//! `engine::compute_summary` or `engine::TaxService` directly, or embed
//! the API via `api::build_router`.

pub mod error;
pub mod models;
pub mod brackets;
pub mod deductions;
pub mod cit;
pub mod vat;
pub mod wht;
pub mod tax;
pub mod ledger;
pub mod compliance;
pub mod engine;
pub mod config;
pub mod api;

pub use engine::{compute_summary, TaxService};
pub use error::{TaxError, TaxResult};
