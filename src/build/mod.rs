mod clean;
mod core;
pub mod deps;
mod feedback;

pub use clean::{artifacts, clean};
pub use core::{BuildOutcome, Builder};
pub use feedback::FeedbackAnalyzer;
pub use test::run_tests;
