use std::sync::{Arc, Mutex};

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use super::error::ApiError;
use super::retry::{RequestKind, RetryPolicy};
use crate::config::Config;
use crate::domain::{
    ApiList, BulkGenerateFees, Class, ClassLog, CreateClass, CreateClassLog, CreateExpense, CreateStudent,
    CreateTest, DashboardReport, Expense, Fee, GenerateFee, LoginPayload, LoginResponse, SignupPayload,
    Student, StudentTestScoreSummary, TestScore, UpdateClass, UpdateClassLog, UpdateExpense, UpdateFee,
    UpdateStudent, UpdateTest, User,
};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// In-memory bearer token. Shared between clones of one `ApiClient`.
#[derive(Debug, Default)]
pub struct TokenStore {
    token: Mutex<Option<String>>,
}

impl TokenStore {
    pub fn new(initial: Option<String>) -> Self {
        Self {
            token: Mutex::new(initial),
        }
    }

    pub fn get(&self) -> Option<String> {
        self.token.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set(&self, token: Option<String>) {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = token.filter(|t| !t.is_empty());
    }

    pub fn clear(&self) {
        self.set(None);
    }

    pub fn is_set(&self) -> bool {
        self.get().is_some()
    }
}

/// Flattens list params into query pairs. Null and empty-string values are
/// dropped; arrays repeat the key.
pub fn encode_query(params: Option<&Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let Some(Value::Object(map)) = params else {
        return pairs;
    };
    for (key, value) in map {
        match value {
            Value::Array(items) => {
                for item in items {
                    if let Some(s) = scalar_to_string(item) {
                        pairs.push((key.clone(), s));
                    }
                }
            }
            other => {
                if let Some(s) = scalar_to_string(other) {
                    pairs.push((key.clone(), s));
                }
            }
        }
    }
    pairs
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

#[derive(Deserialize)]
struct MeResponse {
    user: Option<User>,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base: Url,
    tokens: Arc<TokenStore>,
    retry: bool,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base: config.base_url()?,
            tokens: Arc::new(TokenStore::new(config.api_token.clone())),
            retry: true,
        })
    }

    /// Single attempt per request; used by tests that count backend hits.
    pub fn without_retry(mut self) -> Self {
        self.retry = false;
        self
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str, query: Option<&Value>) -> Result<Url, ApiError> {
        let mut url = self.base.join(path.trim_start_matches('/'))?;
        let pairs = encode_query(query);
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Ok(url)
    }

    fn policy(&self, kind: RequestKind) -> RetryPolicy {
        if self.retry {
            RetryPolicy::for_kind(kind)
        } else {
            RetryPolicy::none()
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: Option<&Value>,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let kind = if method == Method::GET {
            RequestKind::Query
        } else {
            RequestKind::Mutation
        };
        let url = self.url(path, query)?;
        self.policy(kind)
            .run(|| self.send_once(method.clone(), url.clone(), body.as_ref()))
            .await
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<T, ApiError> {
        let request_id = Uuid::new_v4().to_string();
        debug!("{} {} [{}]", method, url, request_id);

        let mut req = self
            .http
            .request(method, url)
            .header(REQUEST_ID_HEADER, &request_id);
        if let Some(token) = self.tokens.get() {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(body) = body {
            req = req.header(CONTENT_TYPE, "application/json").json(body);
        }

        let res = req.send().await?;
        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            return Err(ApiError::from_response(status, &text));
        }
        let raw = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(raw).map_err(|e| ApiError::Decode(e.to_string()))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: Option<&Value>) -> Result<T, ApiError> {
        self.send(Method::GET, path, query, None).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.send(Method::POST, path, None, Some(to_body(body)?)).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.send(Method::PATCH, path, None, Some(to_body(body)?)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.send(Method::DELETE, path, None, None).await
    }

    // Auth

    pub async fn login(&self, payload: &LoginPayload) -> Result<LoginResponse, ApiError> {
        let res: LoginResponse = self.post("auth/login", payload).await?;
        self.tokens.set(Some(res.token.clone()));
        info!("logged in as {}", res.user.email);
        Ok(res)
    }

    pub async fn signup(&self, payload: &SignupPayload) -> Result<LoginResponse, ApiError> {
        let res: LoginResponse = self.post("auth/signup", payload).await?;
        self.tokens.set(Some(res.token.clone()));
        Ok(res)
    }

    pub async fn me(&self) -> Result<User, ApiError> {
        let res: MeResponse = self.get("auth/me", None).await?;
        res.user.ok_or_else(|| ApiError::Decode("Invalid /auth/me response".to_string()))
    }

    pub fn logout(&self) {
        self.tokens.clear();
    }

    // Classes

    pub async fn list_classes(&self, params: Option<&Value>) -> Result<ApiList<Class>, ApiError> {
        self.get("classes", params).await
    }

    pub async fn get_class(&self, id: &str) -> Result<Class, ApiError> {
        self.get(&format!("classes/{}", id), None).await
    }

    pub async fn create_class(&self, payload: &CreateClass) -> Result<Class, ApiError> {
        self.post("classes", payload).await
    }

    pub async fn update_class(&self, id: &str, payload: &UpdateClass) -> Result<Class, ApiError> {
        self.patch(&format!("classes/{}", id), payload).await
    }

    pub async fn delete_class(&self, id: &str) -> Result<(), ApiError> {
        self.delete(&format!("classes/{}", id)).await.map(|_| ())
    }

    // Students

    pub async fn list_students(&self, params: Option<&Value>) -> Result<ApiList<Student>, ApiError> {
        self.get("students", params).await
    }

    pub async fn get_student(&self, id: &str) -> Result<Student, ApiError> {
        self.get(&format!("students/{}", id), None).await
    }

    pub async fn create_student(&self, payload: &CreateStudent) -> Result<Student, ApiError> {
        self.post("students", payload).await
    }

    pub async fn update_student(&self, id: &str, payload: &UpdateStudent) -> Result<Student, ApiError> {
        self.patch(&format!("students/{}", id), payload).await
    }

    pub async fn delete_student(&self, id: &str) -> Result<(), ApiError> {
        self.delete(&format!("students/{}", id)).await.map(|_| ())
    }

    // Fees

    pub async fn list_fees(&self, params: Option<&Value>) -> Result<ApiList<Fee>, ApiError> {
        self.get("fees", params).await
    }

    pub async fn generate_fee(&self, payload: &GenerateFee) -> Result<Fee, ApiError> {
        self.post("fees/generate", payload).await
    }

    /// The backend answers with a summary object whose shape varies, so it is
    /// passed through untyped.
    pub async fn bulk_generate_fees(&self, payload: &BulkGenerateFees) -> Result<Value, ApiError> {
        self.post("fees/bulk-generate", payload).await
    }

    pub async fn update_fee(&self, id: &str, payload: &UpdateFee) -> Result<Fee, ApiError> {
        self.patch(&format!("fees/{}", id), payload).await
    }

    pub async fn delete_fee(&self, id: &str) -> Result<(), ApiError> {
        self.delete(&format!("fees/{}", id)).await.map(|_| ())
    }

    // Class logs

    pub async fn list_class_logs(&self, params: Option<&Value>) -> Result<ApiList<ClassLog>, ApiError> {
        self.get("classlogs", params).await
    }

    pub async fn get_class_log(&self, id: &str) -> Result<ClassLog, ApiError> {
        self.get(&format!("classlogs/{}", id), None).await
    }

    pub async fn create_class_log(&self, payload: &CreateClassLog) -> Result<ClassLog, ApiError> {
        self.post("classlogs", payload).await
    }

    pub async fn update_class_log(&self, id: &str, payload: &UpdateClassLog) -> Result<ClassLog, ApiError> {
        self.patch(&format!("classlogs/{}", id), payload).await
    }

    pub async fn delete_class_log(&self, id: &str) -> Result<(), ApiError> {
        self.delete(&format!("classlogs/{}", id)).await.map(|_| ())
    }

    // Tests

    pub async fn list_tests(&self, params: Option<&Value>) -> Result<ApiList<TestScore>, ApiError> {
        self.get("tests", params).await
    }

    pub async fn get_test(&self, id: &str) -> Result<TestScore, ApiError> {
        self.get(&format!("tests/{}", id), None).await
    }

    pub async fn create_test(&self, payload: &CreateTest) -> Result<TestScore, ApiError> {
        self.post("tests", payload).await
    }

    pub async fn update_test(&self, id: &str, payload: &UpdateTest) -> Result<TestScore, ApiError> {
        self.patch(&format!("tests/{}", id), payload).await
    }

    pub async fn delete_test(&self, id: &str) -> Result<(), ApiError> {
        self.delete(&format!("tests/{}", id)).await.map(|_| ())
    }

    pub async fn student_test_scores(&self, student_id: &str) -> Result<Vec<StudentTestScoreSummary>, ApiError> {
        self.get(&format!("tests/student/{}", student_id), None).await
    }

    // Expenses

    pub async fn list_expenses(&self, params: Option<&Value>) -> Result<ApiList<Expense>, ApiError> {
        self.get("expenses", params).await
    }

    pub async fn create_expense(&self, payload: &CreateExpense) -> Result<Expense, ApiError> {
        self.post("expenses", payload).await
    }

    pub async fn update_expense(&self, id: &str, payload: &UpdateExpense) -> Result<Expense, ApiError> {
        self.patch(&format!("expenses/{}", id), payload).await
    }

    pub async fn delete_expense(&self, id: &str) -> Result<(), ApiError> {
        self.delete(&format!("expenses/{}", id)).await.map(|_| ())
    }

    // Reports

    pub async fn dashboard_report(&self) -> Result<DashboardReport, ApiError> {
        self.get("reports/dashboard", None).await
    }
}

fn to_body<B: Serialize>(body: &B) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_drops_empty_values_and_repeats_arrays() {
        let params = json!({
            "page": 1,
            "search": "",
            "classId": null,
            "status": ["due", "partial"],
            "month": "2025-11"
        });
        let mut pairs = encode_query(Some(&params));
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("month".to_string(), "2025-11".to_string()),
                ("page".to_string(), "1".to_string()),
                ("status".to_string(), "due".to_string()),
                ("status".to_string(), "partial".to_string()),
            ]
        );
        assert!(encode_query(None).is_empty());
    }

    #[test]
    fn urls_are_joined_under_the_base_path() {
        let config = Config::default()
            .with_api_url("http://127.0.0.1:4000/api")
            .expect("url");
        let client = ApiClient::new(&config).expect("client");
        let url = client
            .url("/fees", Some(&json!({ "month": "2025-11" })))
            .expect("url");
        assert_eq!(url.as_str(), "http://127.0.0.1:4000/api/fees?month=2025-11");
    }

    #[test]
    fn token_store_ignores_empty_tokens() {
        let store = TokenStore::new(None);
        store.set(Some(String::new()));
        assert!(!store.is_set());
        store.set(Some("abc".to_string()));
        assert_eq!(store.get().as_deref(), Some("abc"));
        store.clear();
        assert_eq!(store.get(), None);
    }
}
