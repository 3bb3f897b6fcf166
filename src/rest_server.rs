use crate::bridge::{Bridge, BridgeError};
use crate::status::{self, Health, Status as BridgeStatus};
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Status;
use rocket::serde::json::{Json, Value};
use rocket::serde::Serialize;
use rocket::{catch, catchers, get, post, routes, Build, Request, Rocket, State};
use std::sync::Arc;
use tracing::{error, info};

/// API Response
#[derive(Serialize, Debug, Default)]
#[serde(crate = "rocket::serde")]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<String>,
}

impl ApiResponse {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

type ApiResult = (Status, Json<ApiResponse>);

fn error_response(err: &BridgeError) -> ApiResult {
    match err {
        BridgeError::InvalidCommand(_) => (
            Status::BadRequest,
            Json(ApiResponse::failure("Invalid command. Use ON or OFF")),
        ),
        BridgeError::MissingFields => (
            Status::BadRequest,
            Json(ApiResponse::failure("Topic and message required")),
        ),
        BridgeError::Publish(e) => (
            Status::InternalServerError,
            Json(ApiResponse::failure(format!("Failed to publish to MQTT: {}", e))),
        ),
    }
}

fn field<'a>(payload: &'a Value, name: &str) -> Option<&'a str> {
    payload.get(name).and_then(Value::as_str)
}

/// CORS Fairing for Rocket
pub struct Cors;

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, _req: &'r rocket::Request<'_>, res: &mut rocket::Response<'r>) {
        res.set_header(rocket::http::Header::new("Access-Control-Allow-Origin", "*"));
        res.set_header(rocket::http::Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST",
        ));
        res.set_header(rocket::http::Header::new(
            "Access-Control-Allow-Headers",
            "Content-Type",
        ));
    }
}

/// Liveness: broker flag, cloud flag, uptime
#[get("/")]
fn health_handler(bridge: &State<Arc<Bridge>>) -> Json<Health> {
    Json(status::health(bridge))
}

#[get("/status")]
fn status_handler(bridge: &State<Arc<Bridge>>) -> Json<BridgeStatus> {
    Json(status::status(bridge))
}

/// Webhook used by SmartThings to drive the device
#[post("/control", data = "<payload>")]
async fn control_handler(payload: Json<Value>, bridge: &State<Arc<Bridge>>) -> ApiResult {
    match bridge.control(field(&payload, "command")).await {
        Ok(cmd) => (
            Status::Ok,
            Json(ApiResponse {
                success: true,
                message: Some(format!("Command {} sent to device", cmd)),
                ..ApiResponse::default()
            }),
        ),
        Err(e) => {
            if matches!(e, BridgeError::Publish(_)) {
                error!("MQTT publish failed: {}", e);
            }
            error_response(&e)
        }
    }
}

/// Manual publish, for testing the device side
#[post("/publish", data = "<payload>")]
async fn publish_handler(payload: Json<Value>, bridge: &State<Arc<Bridge>>) -> ApiResult {
    let topic = field(&payload, "topic").unwrap_or_default();
    let message = field(&payload, "message").unwrap_or_default();

    match bridge.publish_raw(topic, message).await {
        Ok(()) => (
            Status::Ok,
            Json(ApiResponse {
                success: true,
                message: Some(message.to_string()),
                topic: Some(topic.to_string()),
                ..ApiResponse::default()
            }),
        ),
        Err(e) => error_response(&e),
    }
}

#[catch(400)]
fn bad_request(_req: &Request) -> Json<ApiResponse> {
    Json(ApiResponse::failure("Malformed request body"))
}

#[catch(404)]
fn not_found(req: &Request) -> Json<ApiResponse> {
    Json(ApiResponse::failure(format!("No route for {}", req.uri())))
}

pub fn build_rocket(bridge: Arc<Bridge>, port: u16) -> Rocket<Build> {
    let figment = rocket::Config::figment()
        .merge(("address", "0.0.0.0"))
        .merge(("port", port));

    rocket::custom(figment)
        .manage(bridge)
        .mount(
            "/",
            routes![health_handler, status_handler, control_handler, publish_handler],
        )
        .register("/", catchers![bad_request, not_found])
        .attach(Cors)
}

/// Serves HTTP until a shutdown signal; in-flight requests finish first.
pub async fn run_rest_server(bridge: Arc<Bridge>, port: u16) -> Result<(), rocket::Error> {
    info!("Server running on port {}", port);
    info!("Webhook URL: http://localhost:{}/control", port);
    build_rocket(bridge, port).launch().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::tests::{bridge, FakeCloud, FakePublisher};
    use rocket::http::ContentType;
    use rocket::local::asynchronous::Client;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    async fn client(publisher: Arc<FakePublisher>, cloud: Arc<FakeCloud>) -> Client {
        let bridge = Arc::new(bridge(publisher, cloud));
        Client::tracked(build_rocket(bridge, 0))
            .await
            .expect("valid rocket instance")
    }

    async fn post(client: &Client, path: &str, body: serde_json::Value) -> (Status, Value) {
        let response = client
            .post(path.to_string())
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await;
        let status = response.status();
        let body = response.into_json::<Value>().await.expect("json body");
        (status, body)
    }

    #[rocket::async_test]
    async fn health_reports_broker_and_cloud() {
        let client = client(FakePublisher::connected(), FakeCloud::configured()).await;
        let response = client.get("/").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(
            response.headers().get_one("Access-Control-Allow-Origin"),
            Some("*")
        );

        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["status"], "running");
        assert_eq!(body["mqtt"]["connected"], true);
        assert_eq!(body["mqtt"]["broker"], "broker.test");
        assert_eq!(body["smartthings"]["configured"], true);
        assert!(body["uptime"].is_number());
    }

    #[rocket::async_test]
    async fn status_follows_disconnect_immediately() {
        let publisher = FakePublisher::connected();
        let client = client(publisher.clone(), FakeCloud::configured()).await;

        let body = client.get("/status").dispatch().await.into_json::<Value>().await.unwrap();
        assert_eq!(body["mqtt_connected"], true);
        assert_eq!(
            body["topics"],
            json!({
                "command": "dev/switch/command",
                "state": "dev/switch/state",
                "availability": "dev/availability"
            })
        );

        publisher.connected.store(false, Ordering::SeqCst);
        let body = client.get("/status").dispatch().await.into_json::<Value>().await.unwrap();
        assert_eq!(body["mqtt_connected"], false);
    }

    #[rocket::async_test]
    async fn control_on_publishes_once_retained() {
        let publisher = FakePublisher::connected();
        let client = client(publisher.clone(), FakeCloud::configured()).await;

        let (status, body) = post(&client, "/control", json!({"command": "ON"})).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Command ON sent to device");
        assert_eq!(
            publisher.published(),
            vec![("dev/switch/command".to_string(), "ON".to_string(), true)]
        );
    }

    #[rocket::async_test]
    async fn control_normalizes_case() {
        let publisher = FakePublisher::connected();
        let client = client(publisher.clone(), FakeCloud::configured()).await;

        let (status, _) = post(&client, "/control", json!({"command": "oFf"})).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(publisher.published()[0].1, "OFF");
    }

    #[rocket::async_test]
    async fn control_rejects_invalid_commands_without_publishing() {
        let publisher = FakePublisher::connected();
        let client = client(publisher.clone(), FakeCloud::configured()).await;

        for body in [
            json!({"command": "toggle"}),
            json!({"command": 1}),
            json!({"cmd": "ON"}),
            json!({}),
        ] {
            let (status, response) = post(&client, "/control", body).await;
            assert_eq!(status, Status::BadRequest);
            assert_eq!(response["success"], false);
        }
        assert!(publisher.published().is_empty());
    }

    #[rocket::async_test]
    async fn control_reports_publish_failure() {
        let publisher = FakePublisher::connected();
        publisher.fail.store(true, Ordering::SeqCst);
        let client = client(publisher.clone(), FakeCloud::configured()).await;

        let (status, body) = post(&client, "/control", json!({"command": "off"})).await;
        assert_eq!(status, Status::InternalServerError);
        assert_eq!(body["success"], false);
        assert!(body.get("message").is_none());
    }

    #[rocket::async_test]
    async fn repeated_control_is_not_debounced() {
        let publisher = FakePublisher::connected();
        let client = client(publisher.clone(), FakeCloud::configured()).await;

        for _ in 0..2 {
            let (status, _) = post(&client, "/control", json!({"command": "ON"})).await;
            assert_eq!(status, Status::Ok);
        }
        assert_eq!(publisher.published().len(), 2);
    }

    #[rocket::async_test]
    async fn publish_endpoint_echoes_topic_and_message() {
        let publisher = FakePublisher::connected();
        let client = client(publisher.clone(), FakeCloud::configured()).await;

        let (status, body) = post(
            &client,
            "/publish",
            json!({"topic": "dev/switch/command", "message": "OFF"}),
        )
        .await;
        assert_eq!(status, Status::Ok);
        assert_eq!(
            body,
            json!({"success": true, "topic": "dev/switch/command", "message": "OFF"})
        );

        let (status, body) = post(&client, "/publish", json!({"topic": "dev/x"})).await;
        assert_eq!(status, Status::BadRequest);
        assert_eq!(body["error"], "Topic and message required");
        assert_eq!(publisher.published().len(), 1);
    }

    #[rocket::async_test]
    async fn malformed_json_gets_a_json_error() {
        let publisher = FakePublisher::connected();
        let client = client(publisher.clone(), FakeCloud::configured()).await;

        let response = client
            .post("/control")
            .header(ContentType::JSON)
            .body("{not json")
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
        let body = response.into_json::<Value>().await.unwrap();
        assert_eq!(body["success"], false);
        assert!(publisher.published().is_empty());
    }

    #[rocket::async_test]
    async fn non_object_json_is_a_bad_request() {
        let publisher = FakePublisher::connected();
        let client = client(publisher.clone(), FakeCloud::configured()).await;

        for body in [json!(["ON"]), json!("ON"), json!(null)] {
            let (status, response) = post(&client, "/control", body.clone()).await;
            assert_eq!(status, Status::BadRequest);
            assert_eq!(response["error"], "Invalid command. Use ON or OFF");

            let (status, response) = post(&client, "/publish", body).await;
            assert_eq!(status, Status::BadRequest);
            assert_eq!(response["error"], "Topic and message required");
        }
        assert!(publisher.published().is_empty());
    }
}
