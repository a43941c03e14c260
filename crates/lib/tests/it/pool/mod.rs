//! Connection provider integration tests

mod allow_list_tests;
mod lifecycle_tests;
mod transaction_tests;
