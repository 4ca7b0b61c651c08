use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::api::{ApiClient, ApiError};
use crate::cache::{fetcher, QueryCache, QueryKey};
use crate::cache_keys as keys;
use crate::config::Config;
use crate::domain::{
    ApiList, BulkGenerateFees, Class, ClassLog, CreateClass, CreateClassLog, CreateExpense, CreateStudent,
    CreateTest, DashboardReport, Expense, Fee, GenerateFee, LoginPayload, LoginResponse, SignupPayload,
    Student, StudentTestScoreSummary, TestScore, UpdateClass, UpdateClassLog, UpdateExpense, UpdateFee,
    UpdateStudent, UpdateTest, User,
};

fn decode_err(e: serde_json::Error) -> ApiError {
    ApiError::Decode(e.to_string())
}

/// Cached reads and invalidating mutations over one `ApiClient`.
#[derive(Debug, Clone)]
pub struct Queries {
    api: ApiClient,
    cache: QueryCache,
}

impl Queries {
    pub fn new(api: ApiClient, cache: QueryCache) -> Self {
        Self { api, cache }
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let api = ApiClient::new(config)?;
        let cache = QueryCache::new(config.stale_time, config.gc_time);
        Ok(Self::new(api, cache))
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    async fn read<T, F, Fut>(&self, key: QueryKey, load: F) -> Result<T, ApiError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(ApiClient) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let api = self.api.clone();
        let fetch = fetcher(move || {
            let pending = load(api.clone());
            async move {
                let v = pending.await?;
                serde_json::to_value(v).map_err(decode_err)
            }
        });
        let value = self.cache.get_or_fetch(key, fetch).await?;
        serde_json::from_value(value).map_err(decode_err)
    }

    async fn invalidate(&self, namespaces: &[&str]) {
        for ns in namespaces {
            let started = self.cache.invalidate(ns).await;
            debug!("invalidated {} ({} refetches)", ns, started.len());
        }
    }

    async fn invalidate_record(&self, list: &str, record: &str, id: &str) {
        self.invalidate(&[list]).await;
        let _ = self.cache.invalidate_key(&QueryKey::with_id(record, id)).await;
    }

    // Reads

    pub async fn classes(&self, params: Option<Value>) -> Result<ApiList<Class>, ApiError> {
        let key = QueryKey::with_params(keys::CLASSES, params.as_ref());
        self.read(key, move |api| {
            let p = params.clone();
            async move { api.list_classes(p.as_ref()).await }
        })
        .await
    }

    pub async fn class(&self, id: &str) -> Result<Class, ApiError> {
        let id = id.to_string();
        let key = QueryKey::with_id(keys::CLASS, &id);
        self.read(key, move |api| {
            let id = id.clone();
            async move { api.get_class(&id).await }
        })
        .await
    }

    pub async fn students(&self, params: Option<Value>) -> Result<ApiList<Student>, ApiError> {
        let key = QueryKey::with_params(keys::STUDENTS, params.as_ref());
        self.read(key, move |api| {
            let p = params.clone();
            async move { api.list_students(p.as_ref()).await }
        })
        .await
    }

    pub async fn student(&self, id: &str) -> Result<Student, ApiError> {
        let id = id.to_string();
        let key = QueryKey::with_id(keys::STUDENT, &id);
        self.read(key, move |api| {
            let id = id.clone();
            async move { api.get_student(&id).await }
        })
        .await
    }

    pub async fn fees(&self, params: Option<Value>) -> Result<ApiList<Fee>, ApiError> {
        let key = QueryKey::with_params(keys::FEES, params.as_ref());
        self.read(key, move |api| {
            let p = params.clone();
            async move { api.list_fees(p.as_ref()).await }
        })
        .await
    }

    pub async fn class_logs(&self, params: Option<Value>) -> Result<ApiList<ClassLog>, ApiError> {
        let key = QueryKey::with_params(keys::CLASS_LOGS, params.as_ref());
        self.read(key, move |api| {
            let p = params.clone();
            async move { api.list_class_logs(p.as_ref()).await }
        })
        .await
    }

    pub async fn class_log(&self, id: &str) -> Result<ClassLog, ApiError> {
        let id = id.to_string();
        let key = QueryKey::with_id(keys::CLASS_LOG, &id);
        self.read(key, move |api| {
            let id = id.clone();
            async move { api.get_class_log(&id).await }
        })
        .await
    }

    pub async fn tests(&self, params: Option<Value>) -> Result<ApiList<TestScore>, ApiError> {
        let key = QueryKey::with_params(keys::TESTS, params.as_ref());
        self.read(key, move |api| {
            let p = params.clone();
            async move { api.list_tests(p.as_ref()).await }
        })
        .await
    }

    pub async fn test(&self, id: &str) -> Result<TestScore, ApiError> {
        let id = id.to_string();
        let key = QueryKey::with_id(keys::TEST, &id);
        self.read(key, move |api| {
            let id = id.clone();
            async move { api.get_test(&id).await }
        })
        .await
    }

    pub async fn expenses(&self, params: Option<Value>) -> Result<ApiList<Expense>, ApiError> {
        let key = QueryKey::with_params(keys::EXPENSES, params.as_ref());
        self.read(key, move |api| {
            let p = params.clone();
            async move { api.list_expenses(p.as_ref()).await }
        })
        .await
    }

    pub async fn student_test_scores(&self, student_id: &str) -> Result<Vec<StudentTestScoreSummary>, ApiError> {
        let id = student_id.to_string();
        let key = QueryKey::with_id(keys::STUDENT_TEST_SCORES, &id);
        self.read(key, move |api| {
            let id = id.clone();
            async move { api.student_test_scores(&id).await }
        })
        .await
    }

    pub async fn me(&self) -> Result<User, ApiError> {
        self.read(QueryKey::new(keys::ME), |api| async move { api.me().await })
            .await
    }

    pub async fn dashboard_report(&self) -> Result<DashboardReport, ApiError> {
        self.read(QueryKey::new(keys::DASHBOARD), |api| async move {
            api.dashboard_report().await
        })
        .await
    }

    // Session

    pub async fn login(&self, payload: &LoginPayload) -> Result<LoginResponse, ApiError> {
        let res = self.api.login(payload).await?;
        self.invalidate(&[keys::ME]).await;
        Ok(res)
    }

    pub async fn signup(&self, payload: &SignupPayload) -> Result<LoginResponse, ApiError> {
        let res = self.api.signup(payload).await?;
        self.invalidate(&[keys::ME]).await;
        Ok(res)
    }

    /// Drops the token and every cached query so the next session starts cold.
    pub async fn logout(&self) {
        self.api.logout();
        self.cache.clear().await;
        info!("session cleared");
    }

    pub async fn set_token(&self, token: Option<String>) {
        self.api.tokens().set(token);
        self.cache.clear().await;
    }

    // Classes

    pub async fn create_class(&self, payload: &CreateClass) -> Result<Class, ApiError> {
        let created = self.api.create_class(payload).await?;
        self.invalidate(&[keys::CLASSES]).await;
        Ok(created)
    }

    pub async fn update_class(&self, id: &str, payload: &UpdateClass) -> Result<Class, ApiError> {
        let updated = self.api.update_class(id, payload).await?;
        self.invalidate_record(keys::CLASSES, keys::CLASS, id).await;
        Ok(updated)
    }

    pub async fn delete_class(&self, id: &str) -> Result<(), ApiError> {
        self.api.delete_class(id).await?;
        self.invalidate(&[keys::CLASSES]).await;
        Ok(())
    }

    // Students

    pub async fn create_student(&self, payload: &CreateStudent) -> Result<Student, ApiError> {
        let created = self.api.create_student(payload).await?;
        self.invalidate(&[keys::STUDENTS]).await;
        Ok(created)
    }

    pub async fn update_student(&self, id: &str, payload: &UpdateStudent) -> Result<Student, ApiError> {
        let updated = self.api.update_student(id, payload).await?;
        self.invalidate_record(keys::STUDENTS, keys::STUDENT, id).await;
        Ok(updated)
    }

    pub async fn delete_student(&self, id: &str) -> Result<(), ApiError> {
        self.api.delete_student(id).await?;
        self.invalidate(&[keys::STUDENTS]).await;
        Ok(())
    }

    // Fees

    pub async fn generate_fee(&self, payload: &GenerateFee) -> Result<Fee, ApiError> {
        let fee = self.api.generate_fee(payload).await?;
        self.invalidate(&[keys::FEES]).await;
        Ok(fee)
    }

    pub async fn bulk_generate_fees(&self, payload: &BulkGenerateFees) -> Result<Value, ApiError> {
        let res = self.api.bulk_generate_fees(payload).await?;
        self.invalidate(&[keys::FEES]).await;
        Ok(res)
    }

    pub async fn update_fee(&self, id: &str, payload: &UpdateFee) -> Result<Fee, ApiError> {
        let fee = self.api.update_fee(id, payload).await?;
        self.invalidate(&[keys::FEES]).await;
        Ok(fee)
    }

    pub async fn delete_fee(&self, id: &str) -> Result<(), ApiError> {
        self.api.delete_fee(id).await?;
        self.invalidate(&[keys::FEES]).await;
        Ok(())
    }

    // Class logs

    pub async fn create_class_log(&self, payload: &CreateClassLog) -> Result<ClassLog, ApiError> {
        let created = self.api.create_class_log(payload).await?;
        self.invalidate(&[keys::CLASS_LOGS]).await;
        Ok(created)
    }

    pub async fn update_class_log(&self, id: &str, payload: &UpdateClassLog) -> Result<ClassLog, ApiError> {
        let updated = self.api.update_class_log(id, payload).await?;
        self.invalidate_record(keys::CLASS_LOGS, keys::CLASS_LOG, id).await;
        Ok(updated)
    }

    pub async fn delete_class_log(&self, id: &str) -> Result<(), ApiError> {
        self.api.delete_class_log(id).await?;
        self.invalidate(&[keys::CLASS_LOGS]).await;
        Ok(())
    }

    // Tests

    pub async fn create_test(&self, payload: &CreateTest) -> Result<TestScore, ApiError> {
        let created = self.api.create_test(payload).await?;
        self.invalidate(&[keys::TESTS]).await;
        Ok(created)
    }

    pub async fn update_test(&self, id: &str, payload: &UpdateTest) -> Result<TestScore, ApiError> {
        let updated = self.api.update_test(id, payload).await?;
        self.invalidate_record(keys::TESTS, keys::TEST, id).await;
        Ok(updated)
    }

    pub async fn delete_test(&self, id: &str) -> Result<(), ApiError> {
        self.api.delete_test(id).await?;
        self.invalidate(&[keys::TESTS]).await;
        Ok(())
    }

    // Expenses

    pub async fn create_expense(&self, payload: &CreateExpense) -> Result<Expense, ApiError> {
        let created = self.api.create_expense(payload).await?;
        self.invalidate(&[keys::EXPENSES]).await;
        Ok(created)
    }

    pub async fn update_expense(&self, id: &str, payload: &UpdateExpense) -> Result<Expense, ApiError> {
        let updated = self.api.update_expense(id, payload).await?;
        self.invalidate(&[keys::EXPENSES]).await;
        Ok(updated)
    }

    pub async fn delete_expense(&self, id: &str) -> Result<(), ApiError> {
        self.api.delete_expense(id).await?;
        self.invalidate(&[keys::EXPENSES]).await;
        Ok(())
    }
}

/// Monotonic request counter for one logical view. Only the most recently
/// issued ticket may publish its response. Callers that issue overlapping
/// loads for the same view share one sequencer.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    latest: AtomicU64,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_latest(&self, ticket: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket
    }

    /// Runs `fut` under a fresh ticket. `Ok(None)` when a newer request was
    /// issued while this one was in flight.
    pub async fn run<T, E, Fut>(&self, fut: Fut) -> Result<Option<T>, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let ticket = self.issue();
        let out = fut.await?;
        if self.is_latest(ticket) {
            Ok(Some(out))
        } else {
            debug!("dropping superseded response (ticket {})", ticket);
            Ok(None)
        }
    }
}
