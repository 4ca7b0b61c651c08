//! In-process fake of the tuition backend REST API for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use actix_web::{delete, get, patch, post, web, App, HttpRequest, HttpResponse, HttpServer};
use serde_json::{json, Value};

pub const TOKEN: &str = "tok-123";

pub struct FakeState {
    pub fees: Mutex<Vec<Value>>,
    pub hits: Mutex<HashMap<String, u32>>,
    pub last_headers: Mutex<HashMap<String, String>>,
    pub dashboard_failures: AtomicU32,
}

impl FakeState {
    fn seeded() -> Self {
        Self {
            fees: Mutex::new(fees()),
            hits: Mutex::new(HashMap::new()),
            last_headers: Mutex::new(HashMap::new()),
            dashboard_failures: AtomicU32::new(1),
        }
    }

    fn record(&self, name: &str, req: &HttpRequest) {
        *self.hits.lock().expect("hits").entry(name.to_string()).or_insert(0) += 1;
        let mut headers = self.last_headers.lock().expect("headers");
        for key in ["authorization", "x-request-id"] {
            match req.headers().get(key).and_then(|v| v.to_str().ok()) {
                Some(v) => headers.insert(key.to_string(), v.to_string()),
                None => headers.remove(key),
            };
        }
    }

    pub fn hits(&self, name: &str) -> u32 {
        self.hits.lock().expect("hits").get(name).copied().unwrap_or(0)
    }

    pub fn header(&self, key: &str) -> Option<String> {
        self.last_headers.lock().expect("headers").get(key).cloned()
    }
}

pub fn classes() -> Vec<Value> {
    vec![
        json!({ "_id": "c1", "name": "Maths X", "instructor": "R. Iyer", "feePerMonthINR": 1500 }),
        json!({ "_id": "c2", "name": "Physics XII", "instructor": "S. Khan", "feePerMonthINR": 2000 }),
    ]
}

pub fn students() -> Vec<Value> {
    vec![
        json!({ "_id": "s1", "name": "Asha", "class": "c1", "totalpoints": 80 }),
        json!({ "_id": "s2", "name": "Vikram", "class": "c1", "totalpoints": 95 }),
        json!({ "_id": "s3", "name": "Meera", "class": { "_id": "c1", "name": "Maths X" }, "totalpoints": 80 }),
        json!({ "_id": "s4", "name": "Rahul", "class": "c2", "totalpoints": 50 }),
    ]
}

pub fn fees() -> Vec<Value> {
    vec![
        json!({ "_id": "f1", "student": { "_id": "s1", "name": "Asha" }, "class": "c1", "month": "2025-11",
                "baseAmountINR": 1500, "discountINR": 0, "paidINR": 1500, "status": "paid" }),
        json!({ "_id": "f2", "student": { "_id": "s2", "name": "Vikram" }, "class": "c1", "month": "2025-11",
                "baseAmountINR": 1500, "discountINR": 100, "paidINR": 400, "status": "partial" }),
        json!({ "_id": "f3", "student": { "_id": "s4", "name": "Rahul" }, "class": "c2", "month": "2025-10",
                "baseAmountINR": 2000, "discountINR": 0, "paidINR": 0, "status": "due" }),
        json!({ "_id": "f4", "student": { "_id": "s3", "name": "Meera" }, "class": "c1", "month": "2025-11",
                "baseAmountINR": 1500, "discountINR": 0, "paidINR": 0, "status": "due" }),
    ]
}

pub fn expenses() -> Vec<Value> {
    vec![
        json!({ "_id": "e1", "title": "November rent", "amount": 12000, "category": "Rent", "date": "2025-11-01" }),
        json!({ "_id": "e2", "title": "Zoom licence", "amount": 1500, "category": "Software", "date": "2025-11-03" }),
        json!({ "_id": "e3", "title": "Whiteboard markers", "amount": 300, "category": "", "date": "2025-11-20" }),
        json!({ "_id": "e4", "title": "October rent", "amount": 12000, "category": "Rent", "date": "2025-10-01" }),
    ]
}

pub fn class_logs() -> Vec<Value> {
    vec![
        json!({ "_id": "l1", "class": "c1", "date": "2025-11-03", "topic": "Quadratics",
                "attendance": [ { "student": "s1", "status": "present" }, { "student": "s2", "status": "absent" } ] }),
        json!({ "_id": "l2", "class": "c2", "date": "2025-11-04", "topic": "Optics", "attendance": [] }),
    ]
}

pub fn tests() -> Vec<Value> {
    vec![
        json!({ "_id": "t1", "class": "c1", "title": "Unit Test 1", "date": "2025-11-10", "totalMarks": 50,
                "scores": [ { "student": "s1", "marksObtained": 40 },
                            { "student": "s2", "marksObtained": 45 },
                            { "student": "s3", "marksObtained": 50 } ] }),
        json!({ "_id": "t2", "class": "c2", "title": "Optics Quiz", "date": "2025-11-12", "totalMarks": 20,
                "scores": [ { "student": "s4", "marksObtained": 25 } ] }),
    ]
}

fn envelope(items: Vec<Value>) -> HttpResponse {
    let total = items.len();
    HttpResponse::Ok().json(json!({ "items": items, "total": total }))
}

fn authorized(req: &HttpRequest) -> bool {
    req.headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", TOKEN))
        .unwrap_or(false)
}

fn user(email: &str) -> Value {
    json!({ "_id": "u1", "name": "Admin", "email": email, "centerName": "Bright Minds" })
}

#[post("/auth/login")]
async fn login(state: web::Data<FakeState>, req: HttpRequest, body: web::Json<Value>) -> HttpResponse {
    state.record("login", &req);
    let email = body.get("email").and_then(|v| v.as_str()).unwrap_or("");
    if body.get("password").and_then(|v| v.as_str()) != Some("secret") {
        return HttpResponse::Unauthorized().json(json!({ "error": "Invalid credentials" }));
    }
    HttpResponse::Ok().json(json!({ "token": TOKEN, "user": user(email) }))
}

#[get("/auth/me")]
async fn me(state: web::Data<FakeState>, req: HttpRequest) -> HttpResponse {
    state.record("me", &req);
    if !authorized(&req) {
        return HttpResponse::Unauthorized().json(json!({ "message": "Unauthorized" }));
    }
    HttpResponse::Ok().json(json!({ "user": user("admin@example.com") }))
}

#[get("/classes")]
async fn list_classes(state: web::Data<FakeState>, req: HttpRequest) -> HttpResponse {
    state.record("classes", &req);
    envelope(classes())
}

#[get("/classes/{id}")]
async fn get_class(state: web::Data<FakeState>, req: HttpRequest, path: web::Path<String>) -> HttpResponse {
    state.record("class", &req);
    let id = path.into_inner();
    match classes().into_iter().find(|c| c["_id"] == id.as_str()) {
        Some(c) => HttpResponse::Ok().json(c),
        None => HttpResponse::NotFound().json(json!({ "error": "Class not found" })),
    }
}

#[get("/students")]
async fn list_students(state: web::Data<FakeState>, req: HttpRequest) -> HttpResponse {
    state.record("students", &req);
    envelope(students())
}

#[get("/students/{id}")]
async fn get_student(state: web::Data<FakeState>, req: HttpRequest, path: web::Path<String>) -> HttpResponse {
    state.record("student", &req);
    let id = path.into_inner();
    match students().into_iter().find(|s| s["_id"] == id.as_str()) {
        Some(s) => HttpResponse::Ok().json(s),
        None => HttpResponse::NotFound().json(json!({ "error": "Student not found" })),
    }
}

#[get("/fees")]
async fn list_fees(state: web::Data<FakeState>, req: HttpRequest) -> HttpResponse {
    state.record("fees", &req);
    let items = state.fees.lock().expect("fees").clone();
    envelope(items)
}

#[patch("/fees/{id}")]
async fn update_fee(
    state: web::Data<FakeState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<Value>,
) -> HttpResponse {
    state.record("fee.update", &req);
    let id = path.into_inner();
    let mut fees = state.fees.lock().expect("fees");
    let Some(fee) = fees.iter_mut().find(|f| f["_id"] == id.as_str()) else {
        return HttpResponse::NotFound().json(json!({ "error": "Fee not found" }));
    };
    if let Some(paid) = body.get("paidINR") {
        fee["paidINR"] = paid.clone();
    }
    HttpResponse::Ok().json(fee.clone())
}

#[delete("/fees/{id}")]
async fn delete_fee(state: web::Data<FakeState>, req: HttpRequest, path: web::Path<String>) -> HttpResponse {
    state.record("fee.delete", &req);
    let id = path.into_inner();
    state.fees.lock().expect("fees").retain(|f| f["_id"] != id.as_str());
    HttpResponse::NoContent().finish()
}

#[get("/expenses")]
async fn list_expenses(state: web::Data<FakeState>, req: HttpRequest) -> HttpResponse {
    state.record("expenses", &req);
    envelope(expenses())
}

#[get("/classlogs")]
async fn list_class_logs(state: web::Data<FakeState>, req: HttpRequest) -> HttpResponse {
    state.record("classlogs", &req);
    envelope(class_logs())
}

#[get("/tests")]
async fn list_tests(state: web::Data<FakeState>, req: HttpRequest) -> HttpResponse {
    state.record("tests", &req);
    envelope(tests())
}

#[get("/tests/student/{id}")]
async fn student_scores(state: web::Data<FakeState>, req: HttpRequest, path: web::Path<String>) -> HttpResponse {
    state.record("tests.student", &req);
    if path.into_inner() != "s1" {
        return HttpResponse::Ok().json(json!([]));
    }
    HttpResponse::Ok().json(json!([
        { "testId": "t1", "class": "c1", "date": "2025-11-10", "title": "Unit Test 1",
          "totalMarks": 50, "marksObtained": 40 },
        { "testId": "t9", "class": "c1", "date": "2025-11-20", "title": "Unit Test 2",
          "totalMarks": 20, "marksObtained": null }
    ]))
}

/// Fails with 503 `dashboard_failures` times before answering.
#[get("/reports/dashboard")]
async fn dashboard(state: web::Data<FakeState>, req: HttpRequest) -> HttpResponse {
    state.record("dashboard", &req);
    let remaining = state.dashboard_failures.load(Ordering::SeqCst);
    if remaining > 0 {
        state.dashboard_failures.store(remaining - 1, Ordering::SeqCst);
        return HttpResponse::ServiceUnavailable().body("warming up");
    }
    HttpResponse::Ok().json(json!({
        "financials": { "revenue": 1900, "expenses": 25800, "profit": -23900, "dues": 4500, "status": "Loss" },
        "totalStudents": 4,
        "reports": []
    }))
}

pub struct FakeBackend {
    pub base_url: String,
    pub state: web::Data<FakeState>,
}

/// Starts the fake on its own actix system thread, bound to an ephemeral port.
pub fn start() -> FakeBackend {
    let state = web::Data::new(FakeState::seeded());
    let data = state.clone();
    let (tx, rx) = std::sync::mpsc::channel();

    std::thread::spawn(move || {
        actix_web::rt::System::new().block_on(async move {
            let server = HttpServer::new(move || {
                App::new().app_data(data.clone()).service(
                    web::scope("/api")
                        .service(login)
                        .service(me)
                        .service(list_classes)
                        .service(get_class)
                        .service(list_students)
                        .service(get_student)
                        .service(list_fees)
                        .service(update_fee)
                        .service(delete_fee)
                        .service(list_expenses)
                        .service(list_class_logs)
                        .service(list_tests)
                        .service(student_scores)
                        .service(dashboard),
                )
            })
            .workers(1)
            .bind(("127.0.0.1", 0))
            .expect("bind fake backend");
            let port = server.addrs()[0].port();
            let server = server.run();
            tx.send(port).expect("report port");
            server.await.expect("fake backend");
        });
    });

    let port = rx.recv().expect("fake backend started");
    FakeBackend {
        base_url: format!("http://127.0.0.1:{}/api", port),
        state,
    }
}
