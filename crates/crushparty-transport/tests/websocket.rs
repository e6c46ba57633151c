//! Integration tests for the WebSocket transport against a real client.

#[cfg(feature = "websocket")]
mod websocket {
    use std::sync::Arc;
    use std::time::Duration;

    use crushparty_transport::{Connection, Transport, WebSocketConnection, WebSocketTransport};
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    type Client = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    /// Binds on an ephemeral port and returns one accepted server-side
    /// connection together with the client that dialled it.
    async fn connected_pair() -> (WebSocketConnection, Client) {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("should have local addr");

        let accept = tokio::spawn(async move { transport.accept().await.expect("should accept") });
        let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");
        let server = accept.await.expect("accept task should complete");
        (server, client)
    }

    #[tokio::test]
    async fn test_send_utf8_payload_arrives_as_text_frame() {
        let (server, mut client) = connected_pair().await;

        server
            .send(br#"{"type":"heartbeat_ack"}"#)
            .await
            .expect("send should succeed");

        let msg = client.next().await.unwrap().unwrap();
        assert!(msg.is_text(), "json envelopes should be text frames");
        assert_eq!(msg.into_text().unwrap().as_str(), r#"{"type":"heartbeat_ack"}"#);
    }

    #[tokio::test]
    async fn test_send_non_utf8_payload_arrives_as_binary_frame() {
        let (server, mut client) = connected_pair().await;

        server.send(&[0xff, 0x00, 0xfe]).await.unwrap();

        let msg = client.next().await.unwrap().unwrap();
        assert!(msg.is_binary());
        assert_eq!(msg.into_data().as_ref(), &[0xff, 0x00, 0xfe]);
    }

    #[tokio::test]
    async fn test_recv_accepts_text_and_binary_frames() {
        let (server, mut client) = connected_pair().await;

        client.send(Message::Text("hello".into())).await.unwrap();
        client
            .send(Message::Binary(b"world".to_vec().into()))
            .await
            .unwrap();

        assert_eq!(server.recv().await.unwrap().unwrap(), b"hello");
        assert_eq!(server.recv().await.unwrap().unwrap(), b"world");
    }

    #[tokio::test]
    async fn test_send_while_recv_pending_is_not_blocked() {
        let (server, mut client) = connected_pair().await;
        let server = Arc::new(server);

        let reader = Arc::clone(&server);
        let pending_recv = tokio::spawn(async move { reader.recv().await });
        tokio::task::yield_now().await;

        tokio::time::timeout(Duration::from_secs(2), server.send(b"broadcast"))
            .await
            .expect("send must not wait for the pending recv")
            .unwrap();
        let msg = client.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"broadcast");

        client.send(Message::Text("answer".into())).await.unwrap();
        let received = pending_recv.await.unwrap().unwrap().unwrap();
        assert_eq!(received, b"answer");
    }

    #[tokio::test]
    async fn test_recv_returns_none_on_client_close() {
        let (server, mut client) = connected_pair().await;

        client.send(Message::Close(None)).await.unwrap();

        let result = server.recv().await.expect("recv should not error");
        assert!(result.is_none(), "clean close should yield None");
    }

    #[tokio::test]
    async fn test_close_twice_is_ok_and_blocks_later_sends() {
        let (server, _client) = connected_pair().await;

        server.close().await.expect("first close should succeed");
        server.close().await.expect("second close is a no-op");
        assert!(server.send(b"late").await.is_err());
    }

    #[tokio::test]
    async fn test_accept_assigns_distinct_connection_ids() {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr().unwrap();

        let accept = tokio::spawn(async move {
            let a = transport.accept().await.unwrap();
            let b = transport.accept().await.unwrap();
            (a.id(), b.id())
        });
        let (_c1, _) = tokio_tungstenite::connect_async(format!("ws://{addr}")).await.unwrap();
        let (_c2, _) = tokio_tungstenite::connect_async(format!("ws://{addr}")).await.unwrap();

        let (a, b) = accept.await.unwrap();
        assert_ne!(a, b);
        assert!(a.into_inner() > 0);
    }
}
