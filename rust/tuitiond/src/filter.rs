use serde::Deserialize;
use serde_json::Value;

use crate::calc::{derive_fee_status, normalize_category};
use crate::domain::{Class, ClassLog, Expense, Fee, Student, TestScore};

/// Sentinel meaning "no restriction" for exact-match selectors.
pub const WILDCARD: &str = "All";

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

// Fields are joined with a newline so a match never spans two fields.
fn text_matches(fields: &[&str], needle: &str) -> bool {
    fields.join("\n").to_lowercase().contains(needle)
}

/// Case-insensitive substring search over the extracted fields. A blank
/// query keeps every item in its original order.
pub fn filter_by_text<'a, T, F>(items: &'a [T], query: &str, fields: F) -> Vec<&'a T>
where
    F: Fn(&T) -> Vec<&str>,
{
    let needle = normalize_query(query);
    if needle.is_empty() {
        return items.iter().collect();
    }
    items
        .iter()
        .filter(|item| text_matches(&fields(item), &needle))
        .collect()
}

pub fn filter_by_exact_field<'a, T, F>(
    items: &'a [T],
    selector: F,
    match_value: &str,
    wildcard: &str,
) -> Vec<&'a T>
where
    F: Fn(&T) -> Option<&str>,
{
    if match_value == wildcard {
        return items.iter().collect();
    }
    items
        .iter()
        .filter(|item| selector(item) == Some(match_value))
        .collect()
}

/// Keeps items whose ISO date starts with `prefix`, so `"2025-11"` matches
/// `"2025-11-05"`. An empty prefix keeps everything.
pub fn filter_by_date_prefix<'a, T, F>(items: &'a [T], date_selector: F, prefix: &str) -> Vec<&'a T>
where
    F: Fn(&T) -> &str,
{
    if prefix.is_empty() {
        return items.iter().collect();
    }
    items
        .iter()
        .filter(|item| date_selector(item).starts_with(prefix))
        .collect()
}

/// A set of independent predicates over one collection. Inactive predicates
/// (blank query, wildcard, empty prefix) are never registered.
pub struct ListFilter<T> {
    predicates: Vec<Predicate<T>>,
}

impl<T> Default for ListFilter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ListFilter<T> {
    pub fn new() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }

    pub fn text<F>(mut self, query: &str, fields: F) -> Self
    where
        F: Fn(&T) -> Vec<&str> + Send + Sync + 'static,
    {
        let needle = normalize_query(query);
        if !needle.is_empty() {
            self.predicates
                .push(Box::new(move |item: &T| text_matches(&fields(item), &needle)));
        }
        self
    }

    pub fn exact<F>(mut self, selector: F, match_value: &str, wildcard: &str) -> Self
    where
        F: Fn(&T) -> Option<&str> + Send + Sync + 'static,
    {
        if match_value != wildcard {
            let wanted = match_value.to_string();
            self.predicates
                .push(Box::new(move |item: &T| selector(item) == Some(wanted.as_str())));
        }
        self
    }

    pub fn date_prefix<F>(mut self, date_selector: F, prefix: &str) -> Self
    where
        F: Fn(&T) -> &str + Send + Sync + 'static,
    {
        if !prefix.is_empty() {
            let prefix = prefix.to_string();
            self.predicates
                .push(Box::new(move |item: &T| date_selector(item).starts_with(&prefix)));
        }
        self
    }

    pub fn active_count(&self) -> usize {
        self.predicates.len()
    }

    /// Evaluates every predicate over the whole working set and intersects
    /// the results, preserving input order.
    pub fn apply<'a>(&self, items: &'a [T]) -> Vec<&'a T> {
        let mut keep = vec![true; items.len()];
        for predicate in &self.predicates {
            for (slot, item) in keep.iter_mut().zip(items) {
                if *slot && !predicate(item) {
                    *slot = false;
                }
            }
        }
        items
            .iter()
            .zip(keep)
            .filter_map(|(item, k)| if k { Some(item) } else { None })
            .collect()
    }
}

/// Filter inputs as sent by list screens. Missing selectors mean "All".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewFilters {
    pub search: String,
    pub class_id: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub month: Option<String>,
    pub date: Option<String>,
}

impl ViewFilters {
    pub fn parse(raw: Option<&Value>) -> Result<Self, serde_json::Error> {
        match raw {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(v) => serde_json::from_value(v.clone()),
        }
    }
}

fn selector_or_wildcard(v: &Option<String>) -> &str {
    match v.as_deref().map(str::trim) {
        None | Some("") => WILDCARD,
        Some(s) if s.eq_ignore_ascii_case(WILDCARD) => WILDCARD,
        Some(s) => s,
    }
}

fn prefix_or_empty(v: &Option<String>) -> &str {
    v.as_deref().map(str::trim).unwrap_or("")
}

/// Status matches the status derived from the amounts; a stored label that
/// disagrees with them is ignored.
pub fn fee_filter(f: &ViewFilters) -> ListFilter<Fee> {
    ListFilter::new()
        .text(&f.search, |fee: &Fee| vec![fee.student_name()])
        .exact(|fee: &Fee| Some(fee.class.id()), selector_or_wildcard(&f.class_id), WILDCARD)
        .exact(
            |fee: &Fee| Some(derive_fee_status(fee).as_str()),
            &selector_or_wildcard(&f.status).to_lowercase(),
            &WILDCARD.to_lowercase(),
        )
        .date_prefix(|fee: &Fee| fee.month.as_str(), prefix_or_empty(&f.month))
}

pub fn expense_filter(f: &ViewFilters) -> ListFilter<Expense> {
    ListFilter::new()
        .text(&f.search, |e: &Expense| vec![e.title.as_str()])
        .exact(
            |e: &Expense| Some(normalize_category(&e.category)),
            selector_or_wildcard(&f.category),
            WILDCARD,
        )
        .date_prefix(|e: &Expense| e.date.as_str(), prefix_or_empty(&f.month))
}

pub fn class_log_filter(f: &ViewFilters) -> ListFilter<ClassLog> {
    ListFilter::new()
        .text(&f.search, |log: &ClassLog| {
            vec![
                log.topic.as_deref().unwrap_or(""),
                log.homework.as_deref().unwrap_or(""),
            ]
        })
        .exact(|log: &ClassLog| Some(log.class.id()), selector_or_wildcard(&f.class_id), WILDCARD)
        .date_prefix(|log: &ClassLog| log.date.as_str(), prefix_or_empty(&f.date))
}

pub fn test_filter(f: &ViewFilters) -> ListFilter<TestScore> {
    ListFilter::new()
        .text(&f.search, |t: &TestScore| vec![t.title.as_str()])
        .exact(|t: &TestScore| Some(t.class.id()), selector_or_wildcard(&f.class_id), WILDCARD)
        .date_prefix(|t: &TestScore| t.date.as_str(), prefix_or_empty(&f.date))
}

pub fn class_filter(f: &ViewFilters) -> ListFilter<Class> {
    ListFilter::new().text(&f.search, |c: &Class| {
        vec![c.name.as_str(), c.instructor.as_deref().unwrap_or("")]
    })
}

pub fn student_filter(f: &ViewFilters) -> ListFilter<Student> {
    ListFilter::new()
        .text(&f.search, |s: &Student| {
            let class_name = s
                .class
                .as_ref()
                .and_then(|c| c.populated())
                .map(|c| c.name.as_str())
                .unwrap_or("");
            vec![s.name.as_str(), class_name]
        })
        .exact(|s: &Student| s.class_id(), selector_or_wildcard(&f.class_id), WILDCARD)
}

fn json_path<'a>(v: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|seg| !seg.is_empty())
        .try_fold(v, |cur, seg| cur.get(seg))
}

fn json_str<'a>(v: &'a Value, path: &str) -> Option<&'a str> {
    json_path(v, path).and_then(|x| x.as_str())
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonTextRule {
    #[serde(default)]
    pub query: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonExactRule {
    pub field: String,
    pub value: String,
    #[serde(default = "default_wildcard")]
    pub wildcard: String,
}

fn default_wildcard() -> String {
    WILDCARD.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonDatePrefixRule {
    pub field: String,
    #[serde(default)]
    pub prefix: String,
}

/// Predicates over untyped rows, addressed by dotted field paths
/// (`"student.name"`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JsonFilter {
    pub text: Option<JsonTextRule>,
    pub exact: Vec<JsonExactRule>,
    pub date_prefix: Option<JsonDatePrefixRule>,
}

impl JsonFilter {
    pub fn build(&self) -> ListFilter<Value> {
        let mut filter = ListFilter::new();
        if let Some(rule) = &self.text {
            let fields = rule.fields.clone();
            filter = filter.text(&rule.query, move |row: &Value| {
                fields.iter().map(|f| json_str(row, f).unwrap_or("")).collect()
            });
        }
        for rule in &self.exact {
            let field = rule.field.clone();
            filter = filter.exact(
                move |row: &Value| json_str(row, &field),
                &rule.value,
                &rule.wildcard,
            );
        }
        if let Some(rule) = &self.date_prefix {
            let field = rule.field.clone();
            filter = filter.date_prefix(
                move |row: &Value| json_str(row, &field).unwrap_or(""),
                &rule.prefix,
            );
        }
        filter
    }
}
