//! Collection maintenance utilities for MongoDB
//!
//! This crate provides small, destructive-by-design maintenance operations
//! that run against a live MongoDB collection.
//!
//! # Features
//! - Duplicate removal keyed on a caller-chosen field set
//! - Optional query filter restricting which documents are considered
//! - Batched deletes through a single bulk-write round trip per batch
//! - Bulk upsert of document lists, de-duplicated before writing
//! - Key-field validation against operator injection

pub mod dedup;
pub mod upsert;
pub mod validation;

pub use dedup::{remove_duplicates, Dedup};
pub use mongosweep_common::{Result, SweepError};
pub use upsert::update_documents;
pub use validation::{validate_field_name, validate_key_fields};
