//! End-to-end tests driving the full router over an in-memory database.

use axum::{
    body::{to_bytes, Body},
    http::{
        header::{ACCEPT, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
        Request, StatusCode,
    },
    response::Response,
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::app::build_app;
use crate::state::AppState;

async fn test_app() -> Router {
    build_app(AppState::for_tests().await)
}

fn form_post(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

fn json_post(uri: &str, body: &Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::empty()).expect("request")
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

fn session_cookie_from(response: &Response) -> String {
    response
        .headers()
        .get(SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .expect("session cookie")
        .to_string()
}

async fn register(app: &Router, username: &str, password: &str, role: &str) {
    let body = format!(
        "username={username}&email={username}%40example.com&password={password}&confirm_password={password}&role={role}"
    );
    let response = app
        .clone()
        .oneshot(form_post("/register", &body, None))
        .await
        .expect("register");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

async fn login(app: &Router, username: &str, password: &str) -> String {
    let body = format!("username={username}&password={password}");
    let response = app
        .clone()
        .oneshot(form_post("/login", &body, None))
        .await
        .expect("login");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    session_cookie_from(&response)
}

/// Twelve vitals; the test model's probability is sigmoid(time), so `time`
/// alone steers the category.
fn vitals_json(time: f64) -> Value {
    json!({
        "age": 55, "sex": 1, "anaemia": 0, "creatinine_phosphokinase": 500,
        "diabetes": 0, "ejection_fraction": 40, "high_blood_pressure": 1,
        "platelets": 250000, "serum_creatinine": 1.2, "serum_sodium": 137,
        "smoking": 0, "time": time
    })
}

fn vitals_form(time: f64) -> String {
    format!(
        "age=55&sex=1&anaemia=0&creatinine_phosphokinase=500&diabetes=0&ejection_fraction=40\
         &high_blood_pressure=1&platelets=250000&serum_creatinine=1.2&serum_sodium=137\
         &smoking=0&time={time}"
    )
}

#[tokio::test]
async fn health_is_public() {
    let app = test_app().await;
    let response = app.oneshot(get("/health", None)).await.expect("health");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn register_login_predict_and_history_end_to_end() {
    let app = test_app().await;
    register(&app, "alice", "secret1", "patient").await;
    let cookie = login(&app, "alice", "secret1").await;

    let response = app
        .clone()
        .oneshot(json_post("/api/predict", &vitals_json(7.0), Some(&cookie)))
        .await
        .expect("predict");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    // sigmoid(7) = 0.999089 -> 99.91 on the percent scale
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["probability"], json!(99.91));
    assert_eq!(body["risk_category"], json!("HIGH"));
    assert_eq!(
        body["recommendation"],
        json!("URGENT: Consult cardiologist immediately. Consider additional testing.")
    );

    let response = app
        .clone()
        .oneshot(get("/patient/assessments", Some(&cookie)))
        .await
        .expect("history");
    assert_eq!(response.status(), StatusCode::OK);
    let rows = body_json(response).await;
    let rows = rows.as_array().expect("array");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["risk_category"], json!("HIGH"));
    assert_eq!(rows[0]["age"], json!(55.0));
    assert_eq!(rows[0]["time"], json!(7.0));
}

#[tokio::test]
async fn form_predict_is_equivalent_to_json() {
    let app = test_app().await;
    register(&app, "alice", "secret1", "patient").await;
    let cookie = login(&app, "alice", "secret1").await;

    let response = app
        .clone()
        .oneshot(form_post("/predict", &vitals_form(-5.0), Some(&cookie)))
        .await
        .expect("predict");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["risk_category"], json!("LOW"));
    assert_eq!(
        body["recommendation"],
        json!("Continue regular health check-ups. Maintain healthy lifestyle.")
    );
}

#[tokio::test]
async fn predict_names_the_missing_feature() {
    let app = test_app().await;
    register(&app, "alice", "secret1", "patient").await;
    let cookie = login(&app, "alice", "secret1").await;

    let mut incomplete = vitals_json(7.0);
    incomplete.as_object_mut().expect("object").remove("time");
    let response = app
        .clone()
        .oneshot(json_post("/api/predict", &incomplete, Some(&cookie)))
        .await
        .expect("predict");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().expect("error").contains("time"));
}

#[tokio::test]
async fn register_validates_inputs() {
    let app = test_app().await;

    let cases = [
        ("username=al&password=secret1&confirm_password=secret1", "Username"),
        ("username=alice&password=abc&confirm_password=abc", "Password"),
        (
            "username=alice&password=secret1&confirm_password=other1",
            "Passwords do not match",
        ),
        (
            "username=alice&email=nonsense&password=secret1&confirm_password=secret1",
            "email",
        ),
    ];
    for (body, expected) in cases {
        let response = app
            .clone()
            .oneshot(form_post("/register", body, None))
            .await
            .expect("register");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "case: {body}");
        let json = body_json(response).await;
        assert!(
            json["error"].as_str().expect("error").contains(expected),
            "case: {body}"
        );
    }

    let response = app
        .clone()
        .oneshot(form_post(
            "/register",
            "username=alice&password=secret1&confirm_password=secret1&role=admin",
            None,
        ))
        .await
        .expect("register");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_username_registration_fails_once() {
    let app = test_app().await;
    register(&app, "bob", "secret1", "patient").await;

    let body = "username=bob&password=secret2&confirm_password=secret2";
    let response = app
        .clone()
        .oneshot(form_post("/register", body, None))
        .await
        .expect("register");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], json!("Username already exists"));
}

#[tokio::test]
async fn concurrent_duplicate_registration_admits_exactly_one() {
    let app = test_app().await;
    let body = "username=bob&password=secret1&confirm_password=secret1";

    let (first, second) = tokio::join!(
        app.clone().oneshot(form_post("/register", body, None)),
        app.clone().oneshot(form_post("/register", body, None)),
    );
    let statuses = [
        first.expect("first").status(),
        second.expect("second").status(),
    ];
    let successes = statuses
        .iter()
        .filter(|s| **s == StatusCode::SEE_OTHER)
        .count();
    let rejections = statuses
        .iter()
        .filter(|s| **s == StatusCode::BAD_REQUEST)
        .count();
    assert_eq!(successes, 1, "statuses: {statuses:?}");
    assert_eq!(rejections, 1, "statuses: {statuses:?}");
}

#[tokio::test]
async fn login_failure_is_uniform_for_unknown_user_and_wrong_password() {
    let app = test_app().await;
    register(&app, "alice", "secret1", "patient").await;

    let wrong_password = app
        .clone()
        .oneshot(form_post("/login", "username=alice&password=nope99", None))
        .await
        .expect("login");
    let unknown_user = app
        .clone()
        .oneshot(form_post("/login", "username=zelda&password=nope99", None))
        .await
        .expect("login");

    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_user.status(), StatusCode::UNAUTHORIZED);
    let a = body_text(wrong_password).await;
    let b = body_text(unknown_user).await;
    assert_eq!(a, b);
    assert!(a.contains("Invalid username or password"));
}

#[tokio::test]
async fn gate_denies_missing_sessions_and_wrong_roles_alike() {
    let app = test_app().await;
    register(&app, "alice", "secret1", "patient").await;
    register(&app, "drdoe", "secret1", "doctor").await;
    let patient_cookie = login(&app, "alice", "secret1").await;
    let doctor_cookie = login(&app, "drdoe", "secret1").await;

    // No session.
    let response = app
        .clone()
        .oneshot(get("/patient/assessments", None))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let anonymous = body_text(response).await;

    // Wrong role, both directions.
    let response = app
        .clone()
        .oneshot(get("/doctor/assessments", Some(&patient_cookie)))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_text(response).await, anonymous);

    let response = app
        .clone()
        .oneshot(json_post("/api/predict", &vitals_json(7.0), Some(&doctor_cookie)))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Tampered token.
    let mut tampered = patient_cookie.clone();
    tampered.push('x');
    let response = app
        .clone()
        .oneshot(get("/patient/assessments", Some(&tampered)))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn browser_requests_are_redirected_to_login() {
    let app = test_app().await;
    let request = Request::builder()
        .method("GET")
        .uri("/patient/assessments")
        .header(ACCEPT, "text/html,application/xhtml+xml")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get(LOCATION).expect("location"),
        "/login"
    );
}

#[tokio::test]
async fn index_redirects_by_role() {
    let app = test_app().await;
    register(&app, "drdoe", "secret1", "doctor").await;
    let cookie = login(&app, "drdoe", "secret1").await;

    let response = app.clone().oneshot(get("/", None)).await.expect("request");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers().get(LOCATION).expect("location"), "/login");

    let response = app
        .clone()
        .oneshot(get("/", Some(&cookie)))
        .await
        .expect("request");
    assert_eq!(
        response.headers().get(LOCATION).expect("location"),
        "/doctor/dashboard"
    );
}

#[tokio::test]
async fn logout_clears_the_session_cookie() {
    let app = test_app().await;
    let response = app.oneshot(get("/logout", None)).await.expect("logout");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers().get(LOCATION).expect("location"), "/login");
    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .expect("cookie");
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn login_cookie_is_hardened() {
    let app = test_app().await;
    register(&app, "alice", "secret1", "patient").await;
    let body = "username=alice&password=secret1";
    let response = app
        .clone()
        .oneshot(form_post("/login", body, None))
        .await
        .expect("login");
    assert_eq!(
        response.headers().get(LOCATION).expect("location"),
        "/patient/dashboard"
    );
    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .expect("cookie");
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Strict"));
    assert!(cookie.contains("Max-Age=86400"));
}

async fn seed_doctor_view(app: &Router) -> (String, String) {
    register(app, "alice", "secret1", "patient").await;
    register(app, "drdoe", "secret1", "doctor").await;
    let patient_cookie = login(app, "alice", "secret1").await;
    let doctor_cookie = login(app, "drdoe", "secret1").await;

    // 15 HIGH then 5 LOW assessments.
    for _ in 0..15 {
        let response = app
            .clone()
            .oneshot(json_post("/api/predict", &vitals_json(10.0), Some(&patient_cookie)))
            .await
            .expect("predict");
        assert_eq!(response.status(), StatusCode::OK);
    }
    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(json_post("/api/predict", &vitals_json(-10.0), Some(&patient_cookie)))
            .await
            .expect("predict");
        assert_eq!(response.status(), StatusCode::OK);
    }
    (patient_cookie, doctor_cookie)
}

#[tokio::test]
async fn doctor_pagination_is_total_consistent() {
    let app = test_app().await;
    let (_, doctor_cookie) = seed_doctor_view(&app).await;

    let response = app
        .clone()
        .oneshot(get(
            "/doctor/assessments?risk=HIGH&page=1&per_page=10",
            Some(&doctor_cookie),
        ))
        .await
        .expect("page 1");
    let page1 = body_json(response).await;
    assert_eq!(page1["total"], json!(15));
    assert_eq!(page1["total_pages"], json!(2));
    assert_eq!(page1["assessments"].as_array().expect("rows").len(), 10);

    let response = app
        .clone()
        .oneshot(get(
            "/doctor/assessments?risk=HIGH&page=2&per_page=10",
            Some(&doctor_cookie),
        ))
        .await
        .expect("page 2");
    let page2 = body_json(response).await;
    assert_eq!(page2["assessments"].as_array().expect("rows").len(), 5);

    // Past the end: empty slice, same total.
    let response = app
        .clone()
        .oneshot(get(
            "/doctor/assessments?risk=HIGH&page=3&per_page=10",
            Some(&doctor_cookie),
        ))
        .await
        .expect("page 3");
    let page3 = body_json(response).await;
    assert_eq!(page3["total"], json!(15));
    assert!(page3["assessments"].as_array().expect("rows").is_empty());

    // Concatenated pages reproduce the unpaginated export, in order.
    let response = app
        .clone()
        .oneshot(get("/doctor/assessments.csv?risk=HIGH", Some(&doctor_cookie)))
        .await
        .expect("csv");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).expect("content type"),
        "text/csv"
    );
    let csv_text = body_text(response).await;
    let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
    let csv_rows: Vec<csv::StringRecord> = reader
        .records()
        .map(|r| r.expect("csv record"))
        .collect();
    assert_eq!(csv_rows.len(), 15);

    let paged_ids: Vec<String> = page1["assessments"]
        .as_array()
        .expect("rows")
        .iter()
        .chain(page2["assessments"].as_array().expect("rows").iter())
        .map(|row| row["id"].to_string())
        .collect();
    let csv_ids: Vec<String> = csv_rows.iter().map(|r| r[0].to_string()).collect();
    assert_eq!(paged_ids, csv_ids);
    for row in csv_rows {
        assert_eq!(&row[5], "HIGH");
        assert_eq!(&row[2], "alice");
    }
}

#[tokio::test]
async fn doctor_filters_validate_and_apply() {
    let app = test_app().await;
    let (_, doctor_cookie) = seed_doctor_view(&app).await;

    // Unusable pagination values fall back to defaults.
    let response = app
        .clone()
        .oneshot(get(
            "/doctor/assessments?page=abc&per_page=zero",
            Some(&doctor_cookie),
        ))
        .await
        .expect("request");
    let body = body_json(response).await;
    assert_eq!(body["page"], json!(1));
    assert_eq!(body["per_page"], json!(10));
    assert_eq!(body["total"], json!(20));

    // Case-insensitive username substring.
    let response = app
        .clone()
        .oneshot(get(
            "/doctor/assessments?username=ALI&per_page=50",
            Some(&doctor_cookie),
        ))
        .await
        .expect("request");
    let body = body_json(response).await;
    assert_eq!(body["total"], json!(20));
    assert_eq!(
        body["assessments"][0]["username"],
        json!("alice")
    );

    let response = app
        .clone()
        .oneshot(get(
            "/doctor/assessments?username=nosuch",
            Some(&doctor_cookie),
        ))
        .await
        .expect("request");
    let body = body_json(response).await;
    assert_eq!(body["total"], json!(0));

    // A date window far in the past excludes everything; a wide one matches.
    let response = app
        .clone()
        .oneshot(get(
            "/doctor/assessments?start_date=2000-01-01&end_date=2000-01-02",
            Some(&doctor_cookie),
        ))
        .await
        .expect("request");
    let body = body_json(response).await;
    assert_eq!(body["total"], json!(0));

    let response = app
        .clone()
        .oneshot(get(
            "/doctor/assessments?start_date=2000-01-01&end_date=2099-12-31&risk=low",
            Some(&doctor_cookie),
        ))
        .await
        .expect("request");
    let body = body_json(response).await;
    assert_eq!(body["total"], json!(5));

    // Bad filter values are named, not widened.
    let response = app
        .clone()
        .oneshot(get(
            "/doctor/assessments?risk=catastrophic",
            Some(&doctor_cookie),
        ))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(get(
            "/doctor/assessments?start_date=01/01/2000",
            Some(&doctor_cookie),
        ))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().expect("error").contains("start_date"));
}

#[tokio::test]
async fn doctor_sees_patients_with_counts() {
    let app = test_app().await;
    let (_, doctor_cookie) = seed_doctor_view(&app).await;

    let response = app
        .clone()
        .oneshot(get("/doctor/patients", Some(&doctor_cookie)))
        .await
        .expect("patients");
    let body = body_json(response).await;
    let patients = body.as_array().expect("array");
    assert_eq!(patients.len(), 1);
    assert_eq!(patients[0]["username"], json!("alice"));
    assert_eq!(patients[0]["predictions_count"], json!(20));
    let patient_id = patients[0]["id"].as_i64().expect("id");

    let response = app
        .clone()
        .oneshot(get(
            &format!("/doctor/patients/{patient_id}"),
            Some(&doctor_cookie),
        ))
        .await
        .expect("details");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["username"], json!("alice"));
    assert_eq!(body["predictions"].as_array().expect("rows").len(), 20);

    let response = app
        .clone()
        .oneshot(get("/doctor/patients/9999", Some(&doctor_cookie)))
        .await
        .expect("details");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn patient_history_is_isolated_per_owner() {
    let app = test_app().await;
    register(&app, "alice", "secret1", "patient").await;
    register(&app, "bob", "secret1", "patient").await;
    let alice = login(&app, "alice", "secret1").await;
    let bob = login(&app, "bob", "secret1").await;

    let response = app
        .clone()
        .oneshot(json_post("/api/predict", &vitals_json(10.0), Some(&alice)))
        .await
        .expect("predict");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get("/patient/assessments", Some(&bob)))
        .await
        .expect("history");
    let rows = body_json(response).await;
    assert!(rows.as_array().expect("array").is_empty());
}

#[tokio::test]
async fn api_features_lists_the_training_order() {
    let app = test_app().await;
    let response = app
        .oneshot(get("/api/features", None))
        .await
        .expect("features");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let features = body["features"].as_array().expect("features");
    assert_eq!(features.len(), 12);
    assert_eq!(features[0], json!("age"));
    assert_eq!(features[11], json!("time"));
    assert_eq!(body["feature_descriptions"]["ejection_fraction"]["unit"], json!("%"));
}

#[tokio::test]
async fn profile_update_applies_partially_and_refreshes_the_session() {
    let app = test_app().await;
    register(&app, "alice", "secret1", "patient").await;
    let cookie = login(&app, "alice", "secret1").await;

    let response = app
        .clone()
        .oneshot(get("/profile", Some(&cookie)))
        .await
        .expect("profile");
    let body = body_json(response).await;
    assert_eq!(body["username"], json!("alice"));
    assert_eq!(body["role"], json!("patient"));

    // Short password is rejected with the rule spelled out.
    let response = app
        .clone()
        .oneshot(json_post(
            "/profile/update",
            &json!({ "password": "abc", "confirm_password": "abc" }),
            Some(&cookie),
        ))
        .await
        .expect("update");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Username change re-issues the session cookie.
    let response = app
        .clone()
        .oneshot(json_post(
            "/profile/update",
            &json!({ "username": "alicia" }),
            Some(&cookie),
        ))
        .await
        .expect("update");
    assert_eq!(response.status(), StatusCode::OK);
    let fresh_cookie = session_cookie_from(&response);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));

    let response = app
        .clone()
        .oneshot(get("/profile", Some(&fresh_cookie)))
        .await
        .expect("profile");
    let body = body_json(response).await;
    assert_eq!(body["username"], json!("alicia"));

    // Login works with the new username and the old password.
    login(&app, "alicia", "secret1").await;
}
