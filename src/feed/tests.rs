//! Loopback tests for the feed connection

#[cfg(test)]
mod tests {
    use super::super::protocol::{CMD_GAME_STATE, CMD_ROUND_RESULT, CMD_SUBSCRIBE};
    use super::super::*;
    use crate::session::SessionCoordinator;
    use serde_json::{json, Value};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    const WAIT: Duration = Duration::from_secs(5);

    type ServerSocket = WebSocketStream<TcpStream>;

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    /// Short handshake delays; polling pushed out of the way
    fn fast_config(url: String) -> FeedConfig {
        FeedConfig {
            access_token: "secret".to_string(),
            subscribe_delay_ms: 20,
            state_request_delay_ms: 40,
            reconnect_delay_ms: 50,
            poll_interval_ms: 60_000,
            poll_grace_ms: 60_000,
            connect_timeout_secs: 5,
            ..FeedConfig::with_url(url)
        }
    }

    fn start(config: FeedConfig) -> (FeedHandle, SnapshotReader, JoinHandle<()>) {
        let (coordinator, snapshots) = SessionCoordinator::new();
        let (connection, handle) = FeedConnection::new(config, coordinator);
        let task = tokio::spawn(connection.run());
        (handle, snapshots, task)
    }

    async fn accept(listener: &TcpListener) -> ServerSocket {
        let (tcp, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        accept_async(tcp).await.unwrap()
    }

    async fn next_frame(socket: &mut ServerSocket) -> Value {
        loop {
            match timeout(WAIT, socket.next()).await.expect("frame in time") {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("unexpected server read: {:?}", other),
            }
        }
    }

    fn cmd(frame: &Value) -> Option<i64> {
        frame.get(3).and_then(|body| body.get("cmd")).and_then(Value::as_i64)
    }

    async fn push(socket: &mut ServerSocket, text: &str) {
        socket.send(Message::Text(text.to_string().into())).await.unwrap();
    }

    async fn stop(handle: FeedHandle, task: JoinHandle<()>) {
        handle.shutdown().await.unwrap();
        timeout(WAIT, task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_handshake_order() {
        let (listener, url) = listener().await;
        let (handle, _snapshots, task) = start(fast_config(url));
        let mut server = accept(&listener).await;

        let auth = next_frame(&mut server).await;
        assert_eq!(
            auth,
            json!([1, "MiniGame", "", "", {"agentId": "1", "accessToken": "secret", "reconnect": false}])
        );

        let subscribe = next_frame(&mut server).await;
        assert_eq!(subscribe, json!(["6", "MiniGame", "aviatorPlugin", {"cmd": 100000, "f": true}]));

        assert_eq!(cmd(&next_frame(&mut server).await), Some(CMD_GAME_STATE));
        assert_eq!(cmd(&next_frame(&mut server).await), Some(CMD_ROUND_RESULT));

        let mut status = handle.watch_status();
        timeout(WAIT, status.wait_for(|s| s.state == ConnectionState::Subscribed))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(handle.status().generation, 1);

        stop(handle, task).await;
        assert_eq!(status.borrow().state, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_results_reach_the_coordinator() {
        let (listener, url) = listener().await;
        let (handle, mut snapshots, task) = start(fast_config(url));
        let mut server = accept(&listener).await;
        next_frame(&mut server).await; // auth

        push(&mut server, r#"[5, {"cmd": 100007, "sid": 100, "odd": 1.2}]"#).await;
        push(&mut server, "garbage").await;
        push(&mut server, r#"[5, {"cmd": 100007, "sid": 0, "odd": 9.0}]"#).await;
        push(&mut server, r#"[5, {"cmd": 100016, "sid": 555, "odd": 9.0}]"#).await;
        push(&mut server, r#"[5, {"cmd": 100007, "sid": "101", "odd": 1.3}]"#).await;

        let snapshot = timeout(WAIT, snapshots.wait_for(|s| s.history.len() == 2))
            .await
            .unwrap()
            .unwrap()
            .clone();

        assert_eq!(snapshot.history[0].session_id, "101");
        assert_eq!(snapshot.history[1].session_id, "100");
        assert_eq!(snapshot.accuracy.total, 1);
        assert_eq!(snapshot.next_session_id.as_deref(), Some("102"));
        assert!(handle.status().last_message_at.is_some());

        stop(handle, task).await;
    }

    #[tokio::test]
    async fn test_reconnects_after_close_and_drops_stale_steps() {
        let (listener, url) = listener().await;
        let config = FeedConfig {
            subscribe_delay_ms: 300,
            state_request_delay_ms: 600,
            reconnect_delay_ms: 10,
            ..fast_config(url)
        };
        let (handle, _snapshots, task) = start(config);

        let mut first = accept(&listener).await;
        next_frame(&mut first).await; // auth
        first.close(None).await.unwrap();

        let mut second = accept(&listener).await;
        let auth = next_frame(&mut second).await;
        assert_eq!(auth[0], json!(1));

        // The first generation's subscribe timer fires before ours; only one
        // subscribe may arrive.
        assert_eq!(cmd(&next_frame(&mut second).await), Some(CMD_SUBSCRIBE));
        assert_eq!(cmd(&next_frame(&mut second).await), Some(CMD_GAME_STATE));
        assert_eq!(cmd(&next_frame(&mut second).await), Some(CMD_ROUND_RESULT));

        let status = handle.status();
        assert_eq!(status.generation, 2);
        assert_eq!(status.reconnects, 1);

        stop(handle, task).await;
    }

    #[tokio::test]
    async fn test_manual_reconnect_skips_delay() {
        let (listener, url) = listener().await;
        let config = FeedConfig {
            reconnect_delay_ms: 60_000,
            ..fast_config(url)
        };
        let (handle, _snapshots, task) = start(config);

        let mut first = accept(&listener).await;
        next_frame(&mut first).await;

        handle.reconnect().await.unwrap();

        let mut second = accept(&listener).await;
        assert_eq!(next_frame(&mut second).await[0], json!(1));
        assert_eq!(handle.status().generation, 2);

        stop(handle, task).await;
    }

    #[tokio::test]
    async fn test_polls_latest_result_while_connected() {
        let (listener, url) = listener().await;
        let config = FeedConfig {
            subscribe_delay_ms: 60_000,
            state_request_delay_ms: 60_000,
            poll_interval_ms: 30,
            poll_grace_ms: 0,
            ..fast_config(url)
        };
        let (handle, _snapshots, task) = start(config);
        let mut server = accept(&listener).await;

        assert_eq!(next_frame(&mut server).await[0], json!(1));
        for _ in 0..3 {
            let frame = next_frame(&mut server).await;
            assert_eq!(frame, json!(["6", "MiniGame", "aviatorPlugin", {"cmd": 100007}]));
        }

        stop(handle, task).await;
    }

    #[tokio::test]
    async fn test_shutdown_while_waiting_to_reconnect() {
        let (listener, url) = listener().await;
        let config = FeedConfig {
            reconnect_delay_ms: 60_000,
            ..fast_config(url)
        };
        let (handle, _snapshots, task) = start(config);

        let mut server = accept(&listener).await;
        next_frame(&mut server).await;
        server.close(None).await.unwrap();

        let mut status = handle.watch_status();
        timeout(WAIT, status.wait_for(|s| s.state == ConnectionState::Disconnected))
            .await
            .unwrap()
            .unwrap();

        stop(handle, task).await;
    }

    #[tokio::test]
    async fn test_failed_connect_is_retried() {
        let (listener, url) = listener().await;
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (handle, _snapshots, task) = start(fast_config(url));
        let mut status = handle.watch_status();
        timeout(WAIT, status.wait_for(|s| s.generation >= 2))
            .await
            .unwrap()
            .unwrap();
        assert!(!task.is_finished());

        let listener = TcpListener::bind(addr).await.unwrap();
        let mut server = accept(&listener).await;
        let auth = next_frame(&mut server).await;
        assert_eq!(auth[0], json!(1));
        assert_eq!(auth[4]["accessToken"], "secret");

        let current = handle.status();
        assert!(current.generation >= 2);
        assert!(current.reconnects >= 1);

        stop(handle, task).await;
    }

    #[tokio::test]
    async fn test_tls_handshake_failure_is_retried() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("wss://{}", listener.local_addr().unwrap());

        // Plain TCP peer that hangs up on every ClientHello
        let (accepted_tx, mut accepted) = mpsc::unbounded_channel();
        let acceptor = tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                drop(tcp);
                let _ = accepted_tx.send(());
            }
        });

        let config = FeedConfig {
            connect_timeout_secs: 1,
            ..fast_config(url)
        };
        let (handle, _snapshots, task) = start(config);

        for _ in 0..2 {
            timeout(WAIT, accepted.recv()).await.unwrap().unwrap();
        }
        let mut status = handle.watch_status();
        timeout(WAIT, status.wait_for(|s| s.generation >= 2))
            .await
            .unwrap()
            .unwrap();
        assert!(!task.is_finished());

        stop(handle, task).await;
        acceptor.abort();
    }

    #[tokio::test]
    async fn test_join_feed_task_reports_panics() {
        let (listener, url) = listener().await;
        let (handle, _snapshots, task) = start(fast_config(url));
        accept(&listener).await;
        handle.shutdown().await.unwrap();
        assert!(timeout(WAIT, join_feed_task(task)).await.unwrap());

        let crashed = tokio::spawn(async { panic!("ingester crashed") });
        assert!(!join_feed_task(crashed).await);

        let cancelled = tokio::spawn(std::future::pending::<()>());
        cancelled.abort();
        assert!(!join_feed_task(cancelled).await);
    }

    #[test]
    fn test_client_request_headers() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let _guard = runtime.enter();

        let config = FeedConfig {
            origin: Some("https://example.org".to_string()),
            ..FeedConfig::with_url("wss://feed.example.org/websocket")
        };
        let (coordinator, _) = SessionCoordinator::new();
        let (connection, _handle) = FeedConnection::new(config, coordinator);

        let request = connection.client_request().unwrap();
        assert_eq!(request.headers()[ORIGIN], "https://example.org");
        assert!(request.headers()[USER_AGENT].to_str().unwrap().starts_with("Mozilla"));
    }

    #[test]
    fn test_status_serializes_state_upper_case() {
        let status = FeedStatus {
            state: ConnectionState::Subscribed,
            generation: 3,
            ..Default::default()
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["state"], "SUBSCRIBED");
        assert_eq!(value["generation"], 3);
    }
}
