// Approval desk backend: help-desk staff file directory and network change
// requests, approvers review them, and approved requests are applied to the
// directory in the same transaction that closes them.

pub mod aggregation;
pub mod api;
pub mod app_state;
pub mod config;
pub mod db;
pub mod directory;
pub mod lifecycle;
pub mod middleware;
pub mod notify;
pub mod numbering;
pub mod service;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;
