//! Integration tests - full requests against an in-memory SQLite database
//!
//! These tests verify that compile, execute, assemble and transform work
//! together on a realistic schema.

mod catalog_tests;
mod fixtures;
mod pagination_tests;
mod post_tests;
mod transform_tests;
