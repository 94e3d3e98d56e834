pub mod file_tests;
pub mod concurrency_tests;
