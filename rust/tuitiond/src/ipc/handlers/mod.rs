pub mod calc;
pub mod classes;
pub mod classlogs;
pub mod core;
pub mod expenses;
pub mod fees;
pub mod filter;
pub mod reports;
pub mod students;
pub mod test_scores;
