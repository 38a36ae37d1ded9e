/// OFAC Sanctions Module
///
/// This module contains the sanctioned-party data layer and its REST API:
/// - model.rs: record, summary and search types
/// - store.rs: read-only SQLite queries
/// - api.rs: Actix Web routes under /ofacParty and /party

pub mod api;
pub mod model;
pub mod store;

#[cfg(test)]
pub mod fixtures;
