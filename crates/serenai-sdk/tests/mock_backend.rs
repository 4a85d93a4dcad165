//! End-to-end tests against the mock chat backend over real sockets.

use std::time::Duration;

use serenai_sdk::{
    submit, ChatApi, ChatConfig, ChatEndpoints, ChatHandle, ChatSnapshot, ConnectionState,
    Credential, CredentialSource, EntryKind, SdkError, Submission, WsConnector,
};
use tokio::sync::watch;

const WAIT: Duration = Duration::from_secs(5);

/// Serve the mock backend on an ephemeral port.
async fn serve() -> ChatEndpoints {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, mock_chat::router()).await.unwrap();
    });
    ChatEndpoints::new(&format!("ws://{addr}"), &format!("http://{addr}")).unwrap()
}

async fn wait_for(
    updates: &mut watch::Receiver<ChatSnapshot>,
    f: impl FnMut(&ChatSnapshot) -> bool,
) -> ChatSnapshot {
    let snapshot = tokio::time::timeout(WAIT, updates.wait_for(f))
        .await
        .expect("timed out waiting for snapshot")
        .expect("driver gone")
        .clone();
    snapshot
}

#[tokio::test]
async fn conversation_round_trip() {
    let endpoints = serve().await;
    let auth = CredentialSource::new(Some(Credential::new("user-token")));
    let chat = ChatHandle::spawn(ChatConfig::new(endpoints), WsConnector, auth.subscribe());
    let mut updates = chat.subscribe();

    let snapshot = wait_for(&mut updates, |s| s.connected && !s.messages.is_empty()).await;
    let welcome = snapshot.messages.last().unwrap();
    assert_eq!(welcome.kind, EntryKind::System);
    assert_eq!(welcome.message.content, mock_chat::WELCOME);
    assert_eq!(snapshot.error, None);

    chat.send_typing_status(true).unwrap();
    chat.send("I feel so sad and hopeless").unwrap();

    let snapshot = wait_for(&mut updates, |s| s.messages.len() == 2).await;
    let reply = &snapshot.messages.entries()[1];
    assert_eq!(reply.kind, EntryKind::Chat);
    assert!(!reply.message.is_user);
    let analysis = reply.message.emotion_analysis.as_ref().unwrap();
    assert_eq!(analysis.emotion(), Some("sadness"));
    assert!(analysis.is_distressed());

    // The typing_status echo is not a frame this client consumes.
    let snapshot = wait_for(&mut updates, |s| !s.is_typing).await;
    assert_eq!(snapshot.messages.len(), 2);

    chat.shutdown().await;
}

#[tokio::test]
async fn empty_token_is_rejected_and_retried() {
    let endpoints = serve().await;
    let auth = CredentialSource::new(Some(Credential::new("")));
    let chat = ChatHandle::spawn(ChatConfig::new(endpoints), WsConnector, auth.subscribe());
    let mut updates = chat.subscribe();

    let snapshot = wait_for(&mut updates, |s| {
        matches!(s.state, ConnectionState::Retrying { .. })
    })
    .await;
    assert_eq!(
        snapshot.state,
        ConnectionState::Retrying {
            attempt: 1,
            delay: Duration::from_millis(1000)
        }
    );

    chat.shutdown().await;
}

#[tokio::test]
async fn sign_out_closes_the_socket() {
    let endpoints = serve().await;
    let auth = CredentialSource::new(Some(Credential::new("user-token")));
    let chat = ChatHandle::spawn(ChatConfig::new(endpoints), WsConnector, auth.subscribe());
    let mut updates = chat.subscribe();
    wait_for(&mut updates, |s| s.connected).await;

    auth.clear();
    let snapshot = wait_for(&mut updates, |s| s.state == ConnectionState::Idle).await;
    assert!(snapshot.messages.is_empty());

    chat.send("anyone?").unwrap();
    let snapshot = wait_for(&mut updates, |s| s.error.is_some()).await;
    assert_eq!(snapshot.error.as_deref(), Some("Not connected to chat server"));

    chat.shutdown().await;
}

#[tokio::test]
async fn submit_prefers_realtime() {
    let endpoints = serve().await;
    let api = ChatApi::new(endpoints.clone());
    let credential = Credential::new("user-token");
    let auth = CredentialSource::new(Some(credential.clone()));
    let chat = ChatHandle::spawn(ChatConfig::new(endpoints), WsConnector, auth.subscribe());
    let mut updates = chat.subscribe();
    wait_for(&mut updates, |s| s.connected).await;

    let sent = submit(&chat, &api, Some(&credential), "hello there").await.unwrap();
    assert_eq!(sent, Submission::Realtime);
    wait_for(&mut updates, |s| s.messages.len() == 2).await;

    chat.shutdown().await;
}

#[tokio::test]
async fn submit_falls_back_to_http() {
    let endpoints = serve().await;
    let api = ChatApi::new(endpoints.clone());
    let credential = Credential::new("user-token");
    let auth = CredentialSource::default();
    let chat = ChatHandle::spawn(ChatConfig::new(endpoints), WsConnector, auth.subscribe());

    assert_eq!(
        submit(&chat, &api, Some(&credential), "   ").await.unwrap(),
        Submission::Ignored
    );

    match submit(&chat, &api, Some(&credential), "I'm worried").await.unwrap() {
        Submission::HttpFallback(body) => {
            assert_eq!(body["is_user"], false);
            assert!(body["emotion_analysis"].is_object());
        }
        other => panic!("expected HTTP fallback, got {other:?}"),
    }
    // The HTTP reply is not added to the conversation.
    assert!(chat.snapshot().messages.is_empty());

    assert!(matches!(
        submit(&chat, &api, None, "hello").await,
        Err(SdkError::Unauthenticated)
    ));

    chat.shutdown().await;
}

#[tokio::test]
async fn api_errors_carry_status_and_body() {
    let api = ChatApi::new(serve().await);

    match api.post_message(&Credential::new(""), "hello").await {
        Err(SdkError::Api { status, body }) => {
            assert_eq!(status, 401);
            assert!(body.contains("Not authenticated"));
        }
        other => panic!("expected 401, got {other:?}"),
    }

    match api.post_message(&Credential::new("tok"), &"x".repeat(1001)).await {
        Err(SdkError::Api { status, .. }) => assert_eq!(status, 422),
        other => panic!("expected 422, got {other:?}"),
    }
}
