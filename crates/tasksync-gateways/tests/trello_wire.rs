use std::time::Duration;

use mockito::Matcher;
use tasksync_core::{NewTask, Side, TaskGateway, TaskUpdate};
use tasksync_gateways::{BackoffPolicy, HttpClientConfig, TrelloConfig, TrelloGateway};

fn http_config() -> HttpClientConfig {
    HttpClientConfig {
        timeout: Duration::from_secs(5),
        backoff: BackoffPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        },
        ..HttpClientConfig::default()
    }
}

fn gateway(base: &str) -> TrelloGateway {
    TrelloGateway::new(
        TrelloConfig {
            api_base: base.to_string(),
            api_key: "k".to_string(),
            api_token: "t".to_string(),
            board_id: "b1".to_string(),
            list_id: "l1".to_string(),
        },
        &http_config(),
    )
    .unwrap()
}

fn auth() -> Vec<Matcher> {
    vec![
        Matcher::UrlEncoded("key".into(), "k".into()),
        Matcher::UrlEncoded("token".into(), "t".into()),
    ]
}

#[tokio::test]
async fn lists_board_cards_with_credentials_in_query() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/1/boards/b1/cards")
        .match_query(Matcher::AllOf(auth()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[
                {"id":"c1","name":"Write report","desc":"draft","due":null,"dueComplete":false},
                {"id":"c2","name":"Review PR","desc":"","due":"2026-03-01T09:00:00.000Z","dueComplete":true}
            ]"#,
        )
        .create_async()
        .await;

    let tasks = gateway(&server.url()).list_tasks().await.unwrap();
    mock.assert_async().await;

    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].name, "Write report");
    assert_eq!(tasks[0].description.as_deref(), Some("draft"));
    assert!(!tasks[0].completed);
    assert_eq!(tasks[1].description, None);
    assert!(tasks[1].completed);
    assert!(tasks.iter().all(|t| t.origin == Side::Board));
}

#[tokio::test]
async fn server_errors_are_retried_for_reads() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/1/boards/b1/cards")
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body("unavailable")
        .expect(3)
        .create_async()
        .await;

    let err = gateway(&server.url()).list_tasks().await.unwrap_err();
    mock.assert_async().await;
    assert_eq!(err.status(), Some(503));
}

#[tokio::test]
async fn creates_are_never_replayed() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/1/cards")
        .match_query(Matcher::Any)
        .with_status(502)
        .expect(1)
        .create_async()
        .await;

    let err = gateway(&server.url())
        .create_task(&NewTask {
            name: "Plan trip".into(),
            description: None,
            due_at: None,
        })
        .await
        .unwrap_err();
    mock.assert_async().await;
    assert_eq!(err.status(), Some(502));
}

#[tokio::test]
async fn create_targets_the_configured_list() {
    let mut server = mockito::Server::new_async().await;
    let mut matchers = auth();
    matchers.push(Matcher::UrlEncoded("idList".into(), "l1".into()));
    matchers.push(Matcher::UrlEncoded("name".into(), "Plan trip".into()));
    matchers.push(Matcher::UrlEncoded("desc".into(), "flights".into()));
    let mock = server
        .mock("POST", "/1/cards")
        .match_query(Matcher::AllOf(matchers))
        .with_status(200)
        .with_body(r#"{"id":"c9","name":"Plan trip","desc":"flights","due":null,"dueComplete":false}"#)
        .create_async()
        .await;

    let created = gateway(&server.url())
        .create_task(&NewTask {
            name: "Plan trip".into(),
            description: Some("flights".into()),
            due_at: None,
        })
        .await
        .unwrap();
    mock.assert_async().await;
    assert_eq!(created.external_id, "c9");
}

#[tokio::test]
async fn update_sends_due_complete_flag() {
    let mut server = mockito::Server::new_async().await;
    let mut matchers = auth();
    matchers.push(Matcher::UrlEncoded("dueComplete".into(), "true".into()));
    matchers.push(Matcher::UrlEncoded("due".into(), "null".into()));
    let mock = server
        .mock("PUT", "/1/cards/c1")
        .match_query(Matcher::AllOf(matchers))
        .with_status(200)
        .with_body(r#"{"id":"c1","name":"Write report","desc":"","due":null,"dueComplete":true}"#)
        .create_async()
        .await;

    let updated = gateway(&server.url())
        .update_task(&TaskUpdate {
            external_id: "c1".into(),
            name: "Write report".into(),
            description: None,
            due_at: None,
            completed: true,
        })
        .await
        .unwrap();
    mock.assert_async().await;
    assert!(updated.completed);
}

#[tokio::test]
async fn missing_card_is_none() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/1/cards/gone")
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body("The requested resource was not found.")
        .create_async()
        .await;

    let found = gateway(&server.url()).get_task("gone").await.unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn malformed_payload_is_reported() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/1/boards/b1/cards")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"not":"a list"}"#)
        .create_async()
        .await;

    let err = gateway(&server.url()).list_tasks().await.unwrap_err();
    assert!(matches!(
        err,
        tasksync_core::GatewayError::Malformed { side: Side::Board, .. }
    ));
}

#[tokio::test]
async fn webhook_registration_posts_board_model() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/1/webhooks/")
        .match_query(Matcher::AllOf(auth()))
        .match_body(Matcher::PartialJson(serde_json::json!({
            "callbackURL": "https://example.test/webhook",
            "idModel": "b1"
        })))
        .with_status(200)
        .with_body(r#"{"id":"w1","callbackURL":"https://example.test/webhook","idModel":"b1","active":true}"#)
        .create_async()
        .await;

    let webhook = gateway(&server.url())
        .register_webhook("https://example.test/webhook", "task sync")
        .await
        .unwrap();
    mock.assert_async().await;
    assert_eq!(webhook.id, "w1");
    assert!(webhook.active);
}
