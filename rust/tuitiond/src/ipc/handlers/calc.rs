use serde_json::{json, Value};

use crate::calc;
use crate::domain::{ClassLog, Expense, Fee, Student, StudentTestScoreSummary, TestScore};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{optional, required, required_str, respond, to_json};
use crate::ipc::types::{AppState, Request};

fn list<T: serde::de::DeserializeOwned>(params: &Value, key: &str) -> Result<Vec<T>, HandlerErr> {
    Ok(optional::<Vec<T>>(params, key)?.unwrap_or_default())
}

fn fee_balance(params: &Value) -> Result<Value, HandlerErr> {
    let fee: Fee = required(params, "fee")?;
    Ok(json!({ "balance": calc::fee_balance(&fee) }))
}

fn fee_totals(params: &Value) -> Result<Value, HandlerErr> {
    let fees: Vec<Fee> = list(params, "fees")?;
    to_json(&calc::fee_totals(&fees))
}

fn fee_status(params: &Value) -> Result<Value, HandlerErr> {
    let fee: Fee = required(params, "fee")?;
    Ok(json!({
        "status": calc::derive_fee_status(&fee),
        "stored": fee.status,
        "balance": calc::fee_balance(&fee),
    }))
}

fn test_average(params: &Value) -> Result<Value, HandlerErr> {
    if params.get("tests").is_some() {
        let tests: Vec<TestScore> = list(params, "tests")?;
        return to_json(&calc::test_average_percentages(&tests)?);
    }
    let test: TestScore = required(params, "test")?;
    Ok(json!({
        "averagePercentage": calc::test_average_percentage(&test)?,
        "warnings": to_json(&calc::score_warnings(&test))?,
    }))
}

fn student_percentage(params: &Value) -> Result<Value, HandlerErr> {
    let marks: f64 = required(params, "marksObtained")?;
    let total: f64 = required(params, "totalMarks")?;
    let percentage = calc::per_student_percentage(marks, total)?;
    Ok(json!({
        "percentage": percentage,
        "band": calc::performance_band(percentage),
    }))
}

fn expense_breakdown(params: &Value) -> Result<Value, HandlerErr> {
    let expenses: Vec<Expense> = list(params, "expenses")?;
    Ok(json!({
        "categories": to_json(&calc::expense_category_breakdown(&expenses))?,
        "total": calc::expense_total(&expenses),
    }))
}

fn class_counts(params: &Value) -> Result<Value, HandlerErr> {
    let students: Vec<Student> = list(params, "students")?;
    let logs: Vec<ClassLog> = list(params, "logs")?;
    let tests: Vec<TestScore> = list(params, "tests")?;
    to_json(&calc::class_aggregate_counts(&students, &logs, &tests))
}

fn class_rank(params: &Value) -> Result<Value, HandlerErr> {
    let students: Vec<Student> = list(params, "students")?;
    let target = required_str(params, "studentId")?;
    Ok(json!({ "rank": calc::class_rank(&students, &target) }))
}

fn financials(params: &Value) -> Result<Value, HandlerErr> {
    let fees: Vec<Fee> = list(params, "fees")?;
    let expenses: Vec<Expense> = list(params, "expenses")?;
    to_json(&calc::financial_summary(&fees, &expenses))
}

fn student_test_summary(params: &Value) -> Result<Value, HandlerErr> {
    let rows: Vec<StudentTestScoreSummary> = list(params, "summaries")?;
    to_json(&calc::student_test_summary(&rows)?)
}

pub fn try_handle(_state: &mut AppState, req: &Request) -> Option<Value> {
    let p = &req.params;
    let result = match req.method.as_str() {
        "calc.feeBalance" => fee_balance(p),
        "calc.feeTotals" => fee_totals(p),
        "calc.feeStatus" => fee_status(p),
        "calc.testAverage" => test_average(p),
        "calc.studentPercentage" => student_percentage(p),
        "calc.expenseBreakdown" => expense_breakdown(p),
        "calc.classCounts" => class_counts(p),
        "calc.classRank" => class_rank(p),
        "calc.financials" => financials(p),
        "calc.studentTestSummary" => student_test_summary(p),
        _ => return None,
    };
    Some(respond(req, result))
}
