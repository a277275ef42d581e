//! union-desk — review-queue core for a student-union request desk.
//!
//! Intermediates between students submitting requests (documents, appeals,
//! fee payments, event sign-ups) and the union staff who review them.

pub mod callback;
pub mod channels;
pub mod config;
pub mod error;
pub mod intake;
pub mod queue;
pub mod service;
pub mod status;
pub mod store;
