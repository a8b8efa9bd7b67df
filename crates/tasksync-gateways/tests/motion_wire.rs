use std::time::Duration;

use mockito::Matcher;
use tasksync_core::{NewTask, Side, TaskGateway, TaskUpdate};
use tasksync_gateways::{BackoffPolicy, HttpClientConfig, MotionConfig, MotionGateway};

fn gateway(base: &str) -> MotionGateway {
    MotionGateway::new(
        MotionConfig {
            api_base: base.to_string(),
            api_key: "motion-key".to_string(),
            workspace_id: "ws1".to_string(),
            completed_status: "Completed".to_string(),
            rate_limit: None,
        },
        &HttpClientConfig {
            timeout: Duration::from_secs(5),
            backoff: BackoffPolicy::none(),
            ..HttpClientConfig::default()
        },
    )
    .unwrap()
}

#[tokio::test]
async fn list_follows_cursor_pages() {
    let mut server = mockito::Server::new_async().await;
    let first = server
        .mock("GET", "/v1/tasks")
        .match_header("x-api-key", "motion-key")
        .match_query(Matcher::Exact("workspaceId=ws1&includeAllStatuses=true".into()))
        .with_status(200)
        .with_body(
            r#"{"tasks":[{"id":"m1","name":"Write report","status":{"name":"Completed"}}],
                "meta":{"nextCursor":"page-2","pageSize":1}}"#,
        )
        .create_async()
        .await;
    let second = server
        .mock("GET", "/v1/tasks")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("workspaceId".into(), "ws1".into()),
            Matcher::UrlEncoded("includeAllStatuses".into(), "true".into()),
            Matcher::UrlEncoded("cursor".into(), "page-2".into()),
        ]))
        .with_status(200)
        .with_body(
            r#"{"tasks":[{"id":"m2","name":"Plan trip","description":"book","dueDate":"2026-04-01T00:00:00.000Z","status":{"name":"Todo"}}],
                "meta":{"pageSize":1}}"#,
        )
        .create_async()
        .await;

    let tasks = gateway(&server.url()).list_tasks().await.unwrap();
    first.assert_async().await;
    second.assert_async().await;

    assert_eq!(tasks.len(), 2);
    assert!(tasks[0].completed);
    assert!(!tasks[1].completed);
    assert_eq!(tasks[1].description.as_deref(), Some("book"));
    assert!(tasks[1].due_at.is_some());
    assert!(tasks.iter().all(|t| t.origin == Side::Work));
}

#[tokio::test]
async fn completing_update_sets_completed_status() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PATCH", "/v1/tasks/m1")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "name": "Write report",
            "status": "Completed"
        })))
        .with_status(200)
        .with_body(r#"{"id":"m1","name":"Write report","status":{"name":"Completed"}}"#)
        .create_async()
        .await;

    let updated = gateway(&server.url())
        .update_task(&TaskUpdate {
            external_id: "m1".into(),
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
async fn create_posts_into_workspace() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/tasks")
        .match_body(Matcher::Json(serde_json::json!({
            "name": "Plan trip",
            "workspaceId": "ws1",
            "description": "book flights"
        })))
        .with_status(201)
        .with_body(r#"{"id":"m7","name":"Plan trip","description":"book flights","status":{"name":"Todo"}}"#)
        .create_async()
        .await;

    let created = gateway(&server.url())
        .create_task(&NewTask {
            name: "Plan trip".into(),
            description: Some("book flights".into()),
            due_at: None,
        })
        .await
        .unwrap();
    mock.assert_async().await;
    assert_eq!(created.external_id, "m7");
    assert_eq!(created.origin, Side::Work);
}

#[tokio::test]
async fn unauthorized_surfaces_status_and_body() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/v1/tasks")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body(r#"{"message":"Unauthorized"}"#)
        .create_async()
        .await;

    let err = gateway(&server.url()).list_tasks().await.unwrap_err();
    match err {
        tasksync_core::GatewayError::Status { side, status, body } => {
            assert_eq!(side, Side::Work);
            assert_eq!(status, 401);
            assert!(body.contains("Unauthorized"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
