pub mod common;

mod job_queue_tests;
mod repository_tests;
