//! Minimal handles example: a JSON API with the full middleware stack.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/ok
//!   curl -i http://localhost:3000/users/42
//!   curl -i http://localhost:3000/users/abc          # ParseIntError, hidden
//!   curl -i -X POST http://localhost:3000/users \
//!        -d '{"name":""}'                            # ValidationError, allowed
//!   curl -i http://localhost:3000/boom               # panic, still an envelope
//!   curl -i http://localhost:3000/nowhere            # 404 envelope
//!   curl -i -H 'x-transaction-id: tx-1' http://localhost:3000/ok

use std::sync::Arc;

use handles::middleware::{self, ErrorTranslator, RequestLogger, Tracker, TrackingConfig, TransactionTrust};
use handles::{handler, ApiError, ApiResponse, App, Data, Message, Request, Response, Router, Server};
use serde::{Deserialize, Serialize};

#[tokio::main]
async fn main() -> Result<(), handles::Error> {
    tracing_subscriber::fmt::init();

    let greeter = Arc::new(Greeter { greeting: "hello".to_owned() });

    let routes = Router::new()
        .get("/ok", middleware::response(ok))
        .get("/users/{id}", middleware::response(get_user))
        .post("/users", middleware::response(create_user))
        .get("/greet", middleware::response(handler::bind(greeter, Greeter::greet)))
        .get("/boom", middleware::response(boom))
        .get("/robots.txt", middleware::custom_response(robots));

    let tracker = Tracker::new(TrackingConfig {
        transaction_trust: TransactionTrust::Ip,
        transaction_trust_ips: Some(vec!["127.0.0.1".to_owned(), "::1".to_owned()]),
        ..TrackingConfig::default()
    })?;

    let app = App::new()
        .with(RequestLogger::tracing())
        .with(ErrorTranslator::new().allow("ValidationError"))
        .with(tracker)
        .with(routes)
        .with(middleware::not_found());

    Server::bind("0.0.0.0:3000")?.serve(app).await
}

async fn ok(_req: Request) -> Result<&'static str, ApiError> {
    Ok("ok")
}

#[derive(Serialize)]
struct User {
    id: u64,
    name: String,
}

// GET /users/{id}
//
// A non-numeric id fails with ParseIntError, which is not allowed, so the
// client only sees the generic message.
async fn get_user(req: Request) -> Result<Data<User>, ApiError> {
    let id = req.param("id").unwrap_or_default().parse()?;
    Ok(Data(User { id, name: "alice".to_owned() }))
}

#[derive(Deserialize)]
struct NewUser {
    name: String,
}

// POST /users
async fn create_user(req: Request) -> Result<ApiResponse, ApiError> {
    let new: NewUser = serde_json::from_slice(req.body())?;
    if new.name.is_empty() {
        return Err(ApiError::named("ValidationError", "name must not be empty")
            .with_status(422)
            .with_label("Unprocessable Entity")
            .with_details(serde_json::json!({"field": "name"})));
    }
    let user = User { id: 1, name: new.name };
    Ok(ApiResponse::new(Message::data(user)?)
        .status(201)
        .header("location", "/users/1"))
}

async fn boom(_req: Request) -> Result<(), ApiError> {
    panic!("handler bug");
}

async fn robots(_req: Request) -> Result<Response, ApiError> {
    Ok(Response::text("User-agent: *\nDisallow: /\n"))
}

struct Greeter {
    greeting: String,
}

impl Greeter {
    async fn greet(self: Arc<Self>, req: Request) -> Result<String, ApiError> {
        let who = req.query().unwrap_or("world");
        Ok(format!("{} {who}", self.greeting))
    }
}
