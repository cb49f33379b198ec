//! End-to-end scenarios across the app wiring, the extension registry, the
//! skills extension, and the tool dispatch site.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use quill_app::{App, ToolDispatcher};
use quill_core::config::Config;
use quill_core::message::Message;
use quill_core::permission::{CreatePermissionRequest, PermissionDecision};
use quill_core::session::Session;
use quill_core::tool::ToolCall;
use quill_sdk::{ExtensionInfo, HookSet, MessageHook, PermissionHook, SessionHook, SimpleExtension};

fn extension(name: &str, hooks: HookSet) -> Arc<SimpleExtension> {
    let mut ext = SimpleExtension::new(ExtensionInfo {
        name: name.into(),
        version: "1.0.0".into(),
        description: "integration test extension".into(),
        author: "tests".into(),
    });
    ext.set_hooks(hooks);
    Arc::new(ext)
}

fn permission_request(tool: &str) -> CreatePermissionRequest {
    CreatePermissionRequest {
        session_id: "s1".into(),
        tool_call_id: "c1".into(),
        tool_name: tool.into(),
        description: String::new(),
        action: "execute".into(),
        params: serde_json::json!({}),
        path: "/".into(),
    }
}

#[tokio::test]
async fn test_zero_extension_startup() {
    let config = Config {
        permissions: Some(quill_core::config::PermissionsConfig {
            skip_requests: true,
            allowed_tools: vec![],
        }),
        ..Config::default()
    };

    let app = App::new(config).await.unwrap();

    // Only the built-in skills extension is present.
    let names: Vec<String> = app.registry.list().await.into_iter().map(|i| i.name).collect();
    assert_eq!(names, vec!["quill-skills".to_string()]);

    // No permission hooks loaded: the checkpoint falls through to the
    // (skip-everything) interactive service.
    assert!(app.check_permission(permission_request("view")).await);

    app.shutdown().await;
}

/// Scenario: extension A allows `view` and abstains otherwise; extension B
/// denies everything. The first non-None decision wins.
#[tokio::test]
async fn test_permission_short_circuit_through_checkpoint() {
    struct AllowView;

    #[async_trait]
    impl PermissionHook for AllowView {
        async fn on_permission_request(
            &self,
            _cancel: &CancellationToken,
            request: &CreatePermissionRequest,
        ) -> anyhow::Result<Option<PermissionDecision>> {
            if request.tool_name == "view" {
                Ok(quill_sdk::allow())
            } else {
                Ok(quill_sdk::no_decision())
            }
        }
    }

    struct DenyAll;

    #[async_trait]
    impl PermissionHook for DenyAll {
        async fn on_permission_request(
            &self,
            _cancel: &CancellationToken,
            _request: &CreatePermissionRequest,
        ) -> anyhow::Result<Option<PermissionDecision>> {
            Ok(quill_sdk::deny())
        }
    }

    let app = App::new(Config::default()).await.unwrap();
    let ctx = app.extension_context().clone();
    app.registry
        .load(
            extension("a", HookSet::new().with_permission(Arc::new(AllowView))),
            &ctx,
        )
        .await
        .unwrap();
    app.registry
        .load(
            extension("b", HookSet::new().with_permission(Arc::new(DenyAll))),
            &ctx,
        )
        .await
        .unwrap();

    assert!(app.check_permission(permission_request("view")).await);
    assert!(!app.check_permission(permission_request("write")).await);

    app.shutdown().await;
}

/// Scenario: two skill roots both define `foo`; the later (project-local)
/// root wins, and its content is what the tool returns.
#[tokio::test]
async fn test_skills_priority_and_dispatch() {
    let user_root = tempfile::tempdir().unwrap();
    let project_root = tempfile::tempdir().unwrap();

    for (root, text) in [
        (&user_root, "User-level foo instructions."),
        (&project_root, "Project-level foo instructions."),
    ] {
        let dir = root.path().join("skills").join("foo");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("SKILL.md"),
            format!("---\nname: foo\ndescription: A foo skill used by the priority test\n---\n\n{text}\n"),
        )
        .unwrap();
    }

    let app = App::new(Config::default()).await.unwrap();
    let ctx = app.extension_context().clone();

    // Swap the built-in skills extension for one pinned to the test roots.
    app.registry.unload("quill-skills").await.unwrap();
    app.registry
        .load(
            Arc::new(quill_skills::SkillsExtension::with_roots(vec![
                user_root.path().join("skills"),
                project_root.path().join("skills"),
            ])),
            &ctx,
        )
        .await
        .unwrap();

    let dispatcher = ToolDispatcher::new(app.registry.clone(), vec![]).await;
    assert!(dispatcher.tool_names().contains(&"skills_foo".to_string()));

    let cancel = CancellationToken::new();
    let response = dispatcher
        .execute(
            &cancel,
            "skills_foo",
            ToolCall {
                id: "c1".into(),
                session_id: "s1".into(),
                message_id: "m1".into(),
                input: "{}".into(),
            },
        )
        .await;

    assert!(!response.is_error);
    assert!(response.content.starts_with("Launching skill: foo"));
    assert!(response.content.contains("Project-level foo instructions."));
    assert!(!response.content.contains("User-level"));

    app.shutdown().await;
}

/// Scenario: loading two extensions with the same name; the second load
/// fails and the registry keeps one entry.
#[tokio::test]
async fn test_duplicate_extension_rejected() {
    let app = App::new(Config::default()).await.unwrap();
    let ctx = app.extension_context().clone();

    app.registry
        .load(extension("twin", HookSet::new()), &ctx)
        .await
        .unwrap();
    let err = app
        .registry
        .load(extension("twin", HookSet::new()), &ctx)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("already loaded"));
    let twins = app
        .registry
        .list()
        .await
        .into_iter()
        .filter(|i| i.name == "twin")
        .count();
    assert_eq!(twins, 1);

    app.shutdown().await;
}

/// Scenario: a long-running session hook in extension A must not block
/// message events from reaching extension B — the two streams have
/// dedicated forwarders.
#[tokio::test]
async fn test_event_fan_out_not_blocked_by_slow_hook() {
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    struct SlowSessionHook {
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl SessionHook for SlowSessionHook {
        async fn on_session_created(
            &self,
            _cancel: &CancellationToken,
            _session: &Session,
        ) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_millis(400)).await;
            self.order.lock().unwrap().push("session");
            Ok(())
        }
    }

    struct FastMessageHook {
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl MessageHook for FastMessageHook {
        async fn on_message_created(
            &self,
            _cancel: &CancellationToken,
            _message: &Message,
        ) -> anyhow::Result<()> {
            self.order.lock().unwrap().push("message");
            Ok(())
        }
    }

    let app = App::new(Config::default()).await.unwrap();
    let ctx = app.extension_context().clone();
    app.registry
        .load(
            extension(
                "a",
                HookSet::new().with_session(Arc::new(SlowSessionHook {
                    order: order.clone(),
                })),
            ),
            &ctx,
        )
        .await
        .unwrap();
    app.registry
        .load(
            extension(
                "b",
                HookSet::new().with_message(Arc::new(FastMessageHook {
                    order: order.clone(),
                })),
            ),
            &ctx,
        )
        .await
        .unwrap();

    // A session-created event starts the slow hook; the message event
    // arrives while it is still sleeping.
    let session = app.sessions.create("fan-out").await.unwrap();
    app.messages
        .create(
            &session.id,
            quill_core::message::Role::User,
            vec![serde_json::json!({"text": "hi"})],
        )
        .await
        .unwrap();

    // Wait for both hooks to have run.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if order.lock().unwrap().len() == 2 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "hooks did not both complete in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(*order.lock().unwrap(), vec!["message", "session"]);
    app.shutdown().await;
}
