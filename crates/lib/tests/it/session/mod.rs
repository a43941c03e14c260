//! Session service integration tests

mod concurrency_tests;
mod login_tests;
mod routing_tests;
