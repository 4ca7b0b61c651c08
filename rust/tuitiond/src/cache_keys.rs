//! Query cache namespaces shared by reads and the mutation invalidation rules.

// Collections (keyed by list params)
pub const CLASSES: &str = "classes";
pub const STUDENTS: &str = "students";
pub const FEES: &str = "fees";
pub const CLASS_LOGS: &str = "classlogs";
pub const TESTS: &str = "tests";
pub const EXPENSES: &str = "expenses";

// Single records (keyed by id)
pub const CLASS: &str = "class";
pub const STUDENT: &str = "student";
pub const CLASS_LOG: &str = "classlog";
pub const TEST: &str = "test";
pub const STUDENT_TEST_SCORES: &str = "studentTestScores";

// Session and reports
pub const ME: &str = "me";
pub const DASHBOARD: &str = "dashboard";
