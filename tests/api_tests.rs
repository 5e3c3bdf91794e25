use finance_tracker::api;
use finance_tracker::config::{Config, DatabaseConfig};
use finance_tracker::db;
use rocket::http::{ContentType, Status};
use rocket::local::blocking::Client;
use rocket::serde::json::{json, Value};

fn client() -> Client {
    let config = Config {
        database: DatabaseConfig::in_memory(),
        ..Config::default()
    };
    let pool = db::init_pool(&config.database).expect("in-memory pool");
    Client::tracked(api::build(&config, pool)).expect("valid rocket instance")
}

fn post(client: &Client, uri: &str, body: Value) -> (Status, Value) {
    let response = client.post(uri.to_string()).json(&body).dispatch();
    let status = response.status();
    (status, response.into_json().expect("json body"))
}

fn get(client: &Client, uri: &str) -> (Status, Value) {
    let response = client.get(uri.to_string()).dispatch();
    let status = response.status();
    (status, response.into_json().expect("json body"))
}

fn create_user(client: &Client, email: &str) -> i64 {
    let (status, body) = post(client, "/api/users", json!({ "name": "Alice", "email": email }));
    assert_eq!(status, Status::Created);
    body["id"].as_i64().unwrap()
}

fn create_category(client: &Client, name: &str) -> i64 {
    let (status, body) = post(client, "/api/categories", json!({ "name": name }));
    assert_eq!(status, Status::Created);
    body["id"].as_i64().unwrap()
}

fn create_transaction(client: &Client, user_id: i64, category_id: i64, amount: f64, kind: &str) -> Value {
    let (status, body) = post(
        client,
        "/api/transactions",
        json!({
            "user_id": user_id,
            "category_id": category_id,
            "amount": amount,
            "type": kind,
            "description": "test entry",
        }),
    );
    assert_eq!(status, Status::Created, "{body}");
    body
}

#[test]
fn health_reports_version() {
    let client = client();
    let (status, body) = get(&client, "/api/health");
    assert_eq!(status, Status::Ok);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["timestamp"].is_string());
}

#[test]
fn user_creation_rejects_taken_email() {
    let client = client();
    let id = create_user(&client, "Alice@Example.com");

    let (status, body) = get(&client, &format!("/api/users/{id}"));
    assert_eq!(status, Status::Ok);
    assert_eq!(body["email"], "alice@example.com");

    let (status, body) = post(
        &client,
        "/api/users",
        json!({ "name": "Other", "email": "alice@example.com" }),
    );
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["field"], "email");
    assert!(body["error"].as_str().unwrap().contains("alice@example.com"));

    let (status, body) = post(&client, "/api/users", json!({ "name": "Bob", "email": "not-an-email" }));
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["field"], "email");

    let (status, body) = get(&client, "/api/users");
    assert_eq!(status, Status::Ok);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[test]
fn malformed_body_is_a_validation_error() {
    let client = client();
    let response = client
        .post("/api/users")
        .header(ContentType::JSON)
        .body("{ not json")
        .dispatch();
    assert_eq!(response.status(), Status::BadRequest);
    let body: Value = response.into_json().unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("invalid request body"));

    let (status, _) = post(&client, "/api/users", json!({ "name": "No email" }));
    assert_eq!(status, Status::BadRequest);
}

#[test]
fn groceries_expense_shows_up_in_reports() {
    let client = client();
    let user = create_user(&client, "alice@example.com");
    let groceries = create_category(&client, "Groceries");

    let created = create_transaction(&client, user, groceries, 50.0, "expense");
    assert_eq!(created["amount"].as_f64(), Some(50.0));
    assert_eq!(created["type"], "expense");
    assert_eq!(created["category_name"], "Groceries");

    let (status, body) = get(
        &client,
        &format!("/api/analytics/spending-by-category/{user}?period=monthly"),
    );
    assert_eq!(status, Status::Ok);
    assert_eq!(body, json!({ "Groceries": 50.0 }));

    let (status, body) = get(&client, &format!("/api/analytics/summary/{user}"));
    assert_eq!(status, Status::Ok);
    assert_eq!(body["period"], "monthly");
    assert_eq!(body["total_expense"].as_f64(), Some(50.0));
    assert_eq!(body["total_income"].as_f64(), Some(0.0));
    assert_eq!(body["net"].as_f64(), Some(-50.0));
    assert_eq!(body["transaction_count"], 1);

    let (status, body) = get(&client, &format!("/api/analytics/monthly-trend/{user}?months=3"));
    assert_eq!(status, Status::Ok);
    let months = body.as_array().unwrap();
    assert_eq!(months.len(), 3);
    assert_eq!(months[2]["expense"].as_f64(), Some(50.0));
    assert_eq!(months[0]["expense"].as_f64(), Some(0.0));
}

#[test]
fn unknown_summary_period_falls_back_to_monthly() {
    let client = client();
    let user = create_user(&client, "alice@example.com");
    let (status, body) = get(&client, &format!("/api/analytics/summary/{user}?period=daily"));
    assert_eq!(status, Status::Ok);
    assert_eq!(body["period"], "monthly");

    let (status, body) = get(
        &client,
        &format!("/api/analytics/spending-by-category/{user}?period=daily"),
    );
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["field"], "period");
}

#[test]
fn transaction_filters_and_updates() {
    let client = client();
    let user = create_user(&client, "alice@example.com");
    let salary = create_category(&client, "Salary");
    let food = create_category(&client, "Food");

    create_transaction(&client, user, salary, 2500.0, "income");
    let lunch = create_transaction(&client, user, food, 12.5, "expense");
    let lunch_id = lunch["id"].as_i64().unwrap();

    let (status, body) = get(&client, &format!("/api/transactions?user_id={user}&type=income"));
    assert_eq!(status, Status::Ok);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["type"], "income");

    let (status, body) = get(&client, "/api/transactions?user_id=abc");
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["field"], "user_id");

    let (status, body) = get(&client, "/api/transactions?type=gift");
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["field"], "type");

    let response = client
        .put(format!("/api/transactions/{lunch_id}"))
        .json(&json!({ "amount": 15.75, "description": "bigger lunch" }))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    let updated: Value = response.into_json().unwrap();
    assert_eq!(updated["amount"].as_f64(), Some(15.75));
    assert_eq!(updated["description"], "bigger lunch");
    assert_eq!(updated["type"], "expense");

    let response = client.delete(format!("/api/transactions/{lunch_id}")).dispatch();
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().unwrap();
    assert_eq!(body["message"], "Transaction deleted successfully");

    let (status, body) = get(&client, &format!("/api/transactions/{lunch_id}"));
    assert_eq!(status, Status::NotFound);
    assert!(body["error"].as_str().unwrap().contains("Transaction not found"));
}

#[test]
fn rejects_transactions_for_unknown_references() {
    let client = client();
    let user = create_user(&client, "alice@example.com");
    let food = create_category(&client, "Food");

    let (status, _) = post(
        &client,
        "/api/transactions",
        json!({ "user_id": user, "category_id": 999, "amount": 5.0, "type": "expense" }),
    );
    assert_eq!(status, Status::NotFound);

    let (status, body) = post(
        &client,
        "/api/transactions",
        json!({ "user_id": user, "category_id": food, "amount": -5.0, "type": "expense" }),
    );
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["field"], "amount");

    let (status, body) = post(
        &client,
        "/api/transactions",
        json!({ "user_id": user, "category_id": food, "amount": 2.0e9, "type": "expense" }),
    );
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["field"], "amount");

    let (status, body) = post(
        &client,
        "/api/budgets",
        json!({ "user_id": user, "category_id": food, "amount": 2.0e9 }),
    );
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["field"], "amount");
}

#[test]
fn transaction_date_range_filters() {
    let client = client();
    let user = create_user(&client, "alice@example.com");
    let food = create_category(&client, "Food");

    for date in ["2024-01-10", "2024-01-31T23:30:00", "2024-02-01"] {
        let (status, body) = post(
            &client,
            "/api/transactions",
            json!({
                "user_id": user,
                "category_id": food,
                "amount": 10.0,
                "type": "expense",
                "date": date,
            }),
        );
        assert_eq!(status, Status::Created, "{body}");
    }

    for query in [
        "date_from=2024-01-01&date_to=2024-01-31",
        "start_date=2024-01-01&end_date=2024-01-31",
    ] {
        let (status, body) = get(&client, &format!("/api/transactions?user_id={user}&{query}"));
        assert_eq!(status, Status::Ok, "{query}");
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 2, "{query}");
        assert_eq!(rows[0]["date"], "2024-01-31T23:30:00");
        assert_eq!(rows[1]["date"], "2024-01-10T00:00:00");
    }

    let (status, body) = get(
        &client,
        &format!("/api/transactions?user_id={user}&date_from=2024-02-01"),
    );
    assert_eq!(status, Status::Ok);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = get(
        &client,
        "/api/transactions?date_from=2024-02-01&date_to=2024-01-01",
    );
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["field"], "date_from");

    let (status, body) = get(&client, "/api/transactions?date_to=31/01/2024");
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["field"], "date_to");
}

#[test]
fn budget_status_raises_alert_near_limit() {
    let client = client();
    let user = create_user(&client, "alice@example.com");
    let groceries = create_category(&client, "Groceries");

    let (status, budget) = post(
        &client,
        "/api/budgets",
        json!({ "user_id": user, "category_id": groceries, "amount": 100.0, "period": "monthly" }),
    );
    assert_eq!(status, Status::Created);
    assert_eq!(budget["period"], "monthly");

    let (status, _) = post(
        &client,
        "/api/budgets",
        json!({ "user_id": user, "category_id": groceries, "amount": 200.0 }),
    );
    assert_eq!(status, Status::Conflict);

    create_transaction(&client, user, groceries, 95.0, "expense");

    let (status, body) = get(&client, &format!("/api/analytics/budget-status/{user}"));
    assert_eq!(status, Status::Ok);
    let statuses = body.as_array().unwrap();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0]["spent"].as_f64(), Some(95.0));
    assert_eq!(statuses[0]["remaining"].as_f64(), Some(5.0));
    assert_eq!(statuses[0]["percent_used"].as_f64(), Some(0.95));
    assert_eq!(statuses[0]["alert"], true);
    assert_eq!(statuses[0]["over_budget"], false);

    let (status, body) = get(&client, &format!("/api/budgets?user_id={user}"));
    assert_eq!(status, Status::Ok);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[test]
fn monthly_trend_validates_months() {
    let client = client();
    let user = create_user(&client, "alice@example.com");

    let (status, body) = get(&client, &format!("/api/analytics/monthly-trend/{user}"));
    assert_eq!(status, Status::Ok);
    assert_eq!(body.as_array().unwrap().len(), 6);

    for bad in ["abc", "0", "121"] {
        let (status, body) = get(&client, &format!("/api/analytics/monthly-trend/{user}?months={bad}"));
        assert_eq!(status, Status::BadRequest, "months={bad}");
        assert_eq!(body["field"], "months");
    }
}

#[test]
fn analytics_for_unknown_user_is_not_found() {
    let client = client();
    for path in ["summary", "spending-by-category", "monthly-trend", "budget-status"] {
        let (status, body) = get(&client, &format!("/api/analytics/{path}/42"));
        assert_eq!(status, Status::NotFound, "{path}");
        assert!(body["error"].as_str().unwrap().contains("User not found"));
    }
}

#[test]
fn unmatched_routes_render_json_errors() {
    let client = client();
    let (status, body) = get(&client, "/api/nowhere");
    assert_eq!(status, Status::NotFound);
    assert_eq!(body["error"], "resource not found");
}

#[test]
fn categories_can_be_renamed() {
    let client = client();
    let id = create_category(&client, "Food");
    create_category(&client, "Rent");

    let response = client
        .put(format!("/api/categories/{id}"))
        .json(&json!({ "name": "Dining" }))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().unwrap();
    assert_eq!(body["name"], "Dining");

    let response = client
        .put(format!("/api/categories/{id}"))
        .json(&json!({ "name": "rent" }))
        .dispatch();
    assert_eq!(response.status(), Status::Conflict);

    let (status, body) = get(&client, "/api/categories");
    assert_eq!(status, Status::Ok);
    assert_eq!(body.as_array().unwrap().len(), 2);
}
