use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::{ClassLog, Expense, Fee, FeeStatus, Student, StudentTestScoreSummary, TestScore};

pub const DEFAULT_EXPENSE_CATEGORY: &str = "Other";
pub const LOW_SCORE_PERCENT: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl CalcError {
    pub fn code(&self) -> &'static str {
        match self {
            CalcError::InvalidArgument(_) => "invalid_argument",
        }
    }
}

/// One-decimal display rounding: `floor(10x + 0.5) / 10`.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

fn require_total_marks(total_marks: f64) -> Result<f64, CalcError> {
    if !total_marks.is_finite() || total_marks <= 0.0 {
        return Err(CalcError::InvalidArgument(format!(
            "totalMarks must be greater than zero (got {})",
            total_marks
        )));
    }
    Ok(total_marks)
}

/// `base - discount - paid`. Negative means overpaid and is returned as-is.
pub fn fee_balance(fee: &Fee) -> f64 {
    fee.base_amount_inr - fee.discount_inr - fee.paid_inr
}

pub fn derive_fee_status(fee: &Fee) -> FeeStatus {
    if fee_balance(fee) <= 0.0 {
        FeeStatus::Paid
    } else if fee.paid_inr > 0.0 {
        FeeStatus::Partial
    } else {
        FeeStatus::Due
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FeeTotals {
    pub collected: f64,
    pub pending: f64,
}

pub fn fee_totals(fees: &[Fee]) -> FeeTotals {
    let mut totals = FeeTotals::default();
    for fee in fees {
        totals.collected += fee.paid_inr;
        // Overpayment on one fee never offsets dues on another.
        totals.pending += fee_balance(fee).max(0.0);
    }
    totals
}

/// A non-positive `totalMarks` is rejected before the empty-scores case, so
/// `{ totalMarks: 0, scores: [] }` is an error, not `0`.
pub fn test_average_percentage(test: &TestScore) -> Result<f64, CalcError> {
    let total_marks = require_total_marks(test.total_marks)?;
    if test.scores.is_empty() {
        return Ok(0.0);
    }
    let sum: f64 = test.scores.iter().map(|s| s.marks_obtained).sum();
    let avg = sum / test.scores.len() as f64;
    Ok(round_off_1_decimal(avg / total_marks * 100.0))
}

pub fn per_student_percentage(marks_obtained: f64, total_marks: f64) -> Result<f64, CalcError> {
    let total_marks = require_total_marks(total_marks)?;
    Ok(round_off_1_decimal(marks_obtained / total_marks * 100.0))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestAverageRow {
    pub test_id: String,
    pub title: String,
    pub average_percentage: f64,
    pub score_count: usize,
}

pub fn test_average_percentages(tests: &[TestScore]) -> Result<Vec<TestAverageRow>, CalcError> {
    tests
        .iter()
        .map(|t| {
            Ok(TestAverageRow {
                test_id: t.id.clone(),
                title: t.title.clone(),
                average_percentage: test_average_percentage(t)?,
                score_count: t.scores.len(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreWarning {
    pub student_id: String,
    pub marks_obtained: f64,
    pub total_marks: f64,
}

/// Entries scoring above `totalMarks`. Advisory only; the data is kept as is.
pub fn score_warnings(test: &TestScore) -> Vec<ScoreWarning> {
    test.scores
        .iter()
        .filter(|s| s.marks_obtained > test.total_marks)
        .map(|s| ScoreWarning {
            student_id: s.student.id().to_string(),
            marks_obtained: s.marks_obtained,
            total_marks: test.total_marks,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub amount: f64,
}

pub fn normalize_category(raw: &str) -> &str {
    let t = raw.trim();
    if t.is_empty() {
        DEFAULT_EXPENSE_CATEGORY
    } else {
        t
    }
}

/// Sums per category, largest first. Equal sums keep the order in which the
/// category first appeared.
pub fn expense_category_breakdown(expenses: &[Expense]) -> Vec<CategoryTotal> {
    let mut index_by_category: HashMap<&str, usize> = HashMap::new();
    let mut out: Vec<CategoryTotal> = Vec::new();
    for e in expenses {
        let cat = normalize_category(&e.category);
        match index_by_category.get(cat) {
            Some(&i) => out[i].amount += e.amount,
            None => {
                index_by_category.insert(cat, out.len());
                out.push(CategoryTotal {
                    category: cat.to_string(),
                    amount: e.amount,
                });
            }
        }
    }
    // sort_by is stable.
    out.sort_by(|a, b| b.amount.partial_cmp(&a.amount).unwrap_or(Ordering::Equal));
    out
}

pub fn expense_total(expenses: &[Expense]) -> f64 {
    expenses.iter().map(|e| e.amount).sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassCounts {
    pub student_count: usize,
    pub log_count: usize,
    pub test_count: usize,
}

pub fn class_aggregate_counts(students: &[Student], logs: &[ClassLog], tests: &[TestScore]) -> ClassCounts {
    ClassCounts {
        student_count: students.len(),
        log_count: logs.len(),
        test_count: tests.len(),
    }
}

/// Students ordered by points descending, equal points by ascending id.
pub fn rank_order(students: &[Student]) -> Vec<&Student> {
    let mut sorted: Vec<&Student> = students.iter().collect();
    sorted.sort_by(|a, b| {
        b.total_points
            .partial_cmp(&a.total_points)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    sorted
}

/// 1-based rank of `target_id` within `students`, or `None` when absent.
pub fn class_rank(students: &[Student], target_id: &str) -> Option<usize> {
    rank_order(students)
        .iter()
        .position(|s| s.id == target_id)
        .map(|i| i + 1)
}

pub fn students_in_class(students: &[Student], class_id: &str) -> Vec<Student> {
    students
        .iter()
        .filter(|s| s.class_id() == Some(class_id))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProfitStatus {
    Profit,
    Loss,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialSummary {
    pub revenue: f64,
    pub expenses: f64,
    pub profit: f64,
    pub dues: f64,
    pub status: ProfitStatus,
}

pub fn financial_summary(fees: &[Fee], expenses: &[Expense]) -> FinancialSummary {
    let totals = fee_totals(fees);
    let spent = expense_total(expenses);
    let profit = totals.collected - spent;
    FinancialSummary {
        revenue: totals.collected,
        expenses: spent,
        profit,
        dues: totals.pending,
        status: if profit >= 0.0 {
            ProfitStatus::Profit
        } else {
            ProfitStatus::Loss
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceBand {
    Excellent,
    Good,
    Average,
    Poor,
}

pub fn performance_band(percentage: f64) -> PerformanceBand {
    if percentage >= 90.0 {
        PerformanceBand::Excellent
    } else if percentage >= 60.0 {
        PerformanceBand::Good
    } else if percentage >= 40.0 {
        PerformanceBand::Average
    } else {
        PerformanceBand::Poor
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentTestSummary {
    pub tests_taken: usize,
    pub average_percentage: Option<f64>,
    pub low_score_count: usize,
    pub band: Option<PerformanceBand>,
}

/// Summary over a student's test history. Tests without a recorded mark do
/// not count as taken.
pub fn student_test_summary(rows: &[StudentTestScoreSummary]) -> Result<StudentTestSummary, CalcError> {
    let mut percents: Vec<f64> = Vec::new();
    for row in rows {
        let Some(marks) = row.marks_obtained else {
            continue;
        };
        let total = require_total_marks(row.total_marks)?;
        percents.push(marks / total * 100.0);
    }

    let low_score_count = percents.iter().filter(|p| **p < LOW_SCORE_PERCENT).count();
    let average_percentage = if percents.is_empty() {
        None
    } else {
        Some(round_off_1_decimal(
            percents.iter().sum::<f64>() / percents.len() as f64,
        ))
    };

    Ok(StudentTestSummary {
        tests_taken: percents.len(),
        average_percentage,
        low_score_count,
        band: average_percentage.map(performance_band),
    })
}
