//! Integration tests for the HTTP API
//!
//! Each test starts a server on an ephemeral port over a file-backed database
//! and drives it through the frontend client.

use std::sync::Arc;

use nahb_storage::db::{ReportStatus, Role, StoryStatus};
use nahb_storage::views::{
    AdvanceRequest, CreateChoiceRequest, CreatePageRequest, CreateStoryRequest, RateRequest,
    ReportRequest,
};
use nahb_storage::{
    ClientConfig, EventBus, HttpServer, ServiceAuth, Services, StoryClient, StoryDb, StoryError,
};
use tempfile::TempDir;
use tokio::net::TcpListener;

const SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    _dir: TempDir,
}

impl TestServer {
    fn client(&self) -> StoryClient {
        StoryClient::new(ClientConfig {
            base_url: self.base_url.clone(),
            api_secret: Some(SECRET.into()),
            timeout_secs: 5,
        })
        .unwrap()
    }
}

async fn spawn_server() -> TestServer {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(StoryDb::open(dir.path()).unwrap());
    let services = Arc::new(Services::new(db.clone(), Arc::new(EventBus::new())));
    services
        .accounts
        .bootstrap_admins(&["admin".to_string()])
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(HttpServer::new(
        db,
        services,
        ServiceAuth::new(Some(SECRET.into()), false),
        addr,
    ));
    tokio::spawn(server.serve(listener));

    TestServer {
        base_url: format!("http://{}", addr),
        _dir: dir,
    }
}

/// Registers "ann" as an author and builds: A --"go north"--> B (ending)
async fn seed_story(client: &StoryClient) -> (i64, i64, i64, i64) {
    let admin = client.acting_as("admin");
    admin.register("ann").await.unwrap();
    admin.set_role("ann", Role::Author).await.unwrap();

    let ann = client.acting_as("ann");
    let story = ann
        .create_story(&CreateStoryRequest {
            title: "The Cave".into(),
            description: Some("A short escape".into()),
            status: Some(StoryStatus::Published),
        })
        .await
        .unwrap();
    let a = ann
        .create_page(
            story.id,
            &CreatePageRequest {
                text: "You wake in a cave.".into(),
                is_ending: false,
                ending_label: None,
            },
        )
        .await
        .unwrap();
    let b = ann
        .create_page(
            story.id,
            &CreatePageRequest {
                text: "Daylight.".into(),
                is_ending: true,
                ending_label: Some("You escaped".into()),
            },
        )
        .await
        .unwrap();
    let choice = ann
        .add_choice(
            a.id,
            &CreateChoiceRequest {
                text: "go north".into(),
                next_page_id: b.id,
            },
        )
        .await
        .unwrap();

    (story.id, a.id, b.id, choice.id)
}

#[tokio::test]
async fn test_play_through_to_ending() {
    let server = spawn_server().await;
    let client = server.client();
    let (story, a, b, go_north) = seed_story(&client).await;

    let detail = client.get_story(story).await.unwrap();
    assert_eq!(detail.story.start_page_id, Some(a));
    assert_eq!(detail.rating.rating_count, 0);

    let listed = client.list_stories(None, Some("cave")).await.unwrap();
    assert_eq!(listed.len(), 1);

    let session = nahb_storage::client::new_session_id();

    // Looking ahead along a choice is a plain read
    let peek = client.follow_choice(a, go_north).await.unwrap();
    assert_eq!(peek.id, b);
    assert!(peek.is_ending);
    let err = client.follow_choice(b, go_north).await.unwrap_err();
    assert!(matches!(err, StoryError::Validation(_)));

    let view = client.begin_or_resume(story, &session, false).await.unwrap();
    assert!(!view.resumed);
    assert_eq!(view.page.page.id, a);
    assert_eq!(view.page.choices.len(), 1);

    let outcome = client
        .advance(&AdvanceRequest {
            session_id: session.clone(),
            page_id: a,
            choice_id: go_north,
            player_id: Some("pat".into()),
        })
        .await
        .unwrap();
    assert!(outcome.completed);
    assert_eq!(outcome.ending_label.as_deref(), Some("You escaped"));

    // Replaying the same step finds no active session
    let replay = client
        .advance(&AdvanceRequest {
            session_id: session.clone(),
            page_id: a,
            choice_id: go_north,
            player_id: Some("pat".into()),
        })
        .await
        .unwrap_err();
    assert!(matches!(replay, StoryError::NotFound(_)));

    let stats = client.statistics().await.unwrap();
    assert_eq!(stats.total_plays, 1);
    let ending = &stats.stories[&story].per_terminal_page[&b];
    assert_eq!(ending.count, 1);
    assert_eq!(ending.percentage, 100.0);

    let history = client.player_history("pat").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].ending_page_id, b);

    let fresh = client.begin_or_resume(story, &session, false).await.unwrap();
    assert!(!fresh.resumed);
    assert_eq!(fresh.page.page.id, a);
}

#[tokio::test]
async fn test_writes_require_secret_and_role() {
    let server = spawn_server().await;
    let client = server.client();
    let (story, _a, b, _) = seed_story(&client).await;

    let anonymous = StoryClient::new(ClientConfig {
        base_url: server.base_url.clone(),
        api_secret: None,
        timeout_secs: 5,
    })
    .unwrap();
    let err = anonymous
        .begin_or_resume(story, "s1", false)
        .await
        .unwrap_err();
    assert!(matches!(err, StoryError::Unauthorized(_)));

    let player = client.acting_as("pat");
    player.register("pat").await.unwrap();
    let err = player
        .create_story(&CreateStoryRequest {
            title: "Mine".into(),
            description: None,
            status: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoryError::Forbidden(_)));

    let err = player.set_role("pat", Role::Admin).await.unwrap_err();
    assert!(matches!(err, StoryError::Forbidden(_)));

    // Adding a choice to an ending is a conflict even for the owner
    let err = client
        .acting_as("ann")
        .add_choice(
            b,
            &CreateChoiceRequest {
                text: "back".into(),
                next_page_id: b,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoryError::Conflict(_)));
}

#[tokio::test]
async fn test_suspend_is_admin_only() {
    let server = spawn_server().await;
    let client = server.client();
    let (story, ..) = seed_story(&client).await;

    let err = client
        .acting_as("ann")
        .set_story_status(story, StoryStatus::Suspended)
        .await
        .unwrap_err();
    assert!(matches!(err, StoryError::Forbidden(_)));

    let suspended = client
        .acting_as("admin")
        .set_story_status(story, StoryStatus::Suspended)
        .await
        .unwrap();
    assert_eq!(suspended.status, StoryStatus::Suspended);

    assert!(client.list_stories(None, None).await.unwrap().is_empty());
    let err = client.begin_or_resume(story, "s1", false).await.unwrap_err();
    assert!(matches!(err, StoryError::Conflict(_)));
}

#[tokio::test]
async fn test_feedback_flow() {
    let server = spawn_server().await;
    let client = server.client();
    let (story, ..) = seed_story(&client).await;

    let rating = RateRequest {
        player_id: "pat".into(),
        score: 4,
        comment: None,
    };
    client.rate_story(story, &rating).await.unwrap();
    let summary = client
        .rate_story(
            story,
            &RateRequest {
                score: 2,
                ..rating.clone()
            },
        )
        .await
        .unwrap();
    assert_eq!(summary.rating_count, 1);
    assert_eq!(summary.average_score, Some(2.0));

    let report = ReportRequest {
        player_id: "pat".into(),
        reason: "Spoilers in the title".into(),
    };
    let first = client.report_story(story, &report).await.unwrap();
    assert!(!first.duplicate);
    let second = client.report_story(story, &report).await.unwrap();
    assert!(second.duplicate);
    assert_eq!(second.report.id, first.report.id);

    let pending = client
        .acting_as("admin")
        .list_reports(Some(ReportStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);

    let err = client
        .acting_as("ann")
        .list_reports(None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoryError::Forbidden(_)));
}

#[tokio::test]
async fn test_unknown_fields_and_routes() {
    let server = spawn_server().await;
    let client = server.client();
    let (story, ..) = seed_story(&client).await;

    let raw = reqwest::Client::new();
    let response = raw
        .post(format!("{}/stories/{}/play", server.base_url, story))
        .bearer_auth(SECRET)
        .json(&serde_json::json!({ "session_id": "s1", "restrat": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    let response = raw
        .get(format!("{}/nowhere", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    let health: serde_json::Value = raw
        .get(format!("{}/health", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["stories"], 1);
}
