//! Connector integration tests over real TCP sockets
//!
//! Every test binds its own peer on 127.0.0.1:0 and drives the
//! `ConnectionManager` the way the gateway binary does.

use codec::{
    build_codec, CodecConfiguration, FieldContent, FieldDefinition, FieldFormat, Iso8583Config,
    Iso8583Message, MllpConfig,
};
use gateway_config::{load_config, ConnectionDefinition, EndpointConfig};
use network::{ConnectionManager, ConnectorError, ServiceRecordLookup, StaticServiceDirectory};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use types::{ConnectionId, ExchangePattern, StructuredMessage};

/// Peer that answers every decoded frame with `reply(frame)`
async fn spawn_peer<F>(codec: CodecConfiguration, reply: F) -> (SocketAddr, Arc<AtomicUsize>)
where
    F: Fn(StructuredMessage) -> Option<StructuredMessage> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let codec = build_codec(&codec, 64 * 1024).unwrap();
    let reply = Arc::new(reply);

    let counter = accepted.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let codec = codec.clone();
            let reply = reply.clone();
            tokio::spawn(async move {
                let mut state = codec.new_state();
                let mut buf = vec![0u8; 4096];
                loop {
                    let n = match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    for message in codec.decode(&mut state, &buf[..n]).unwrap() {
                        if let Some(response) = reply(message) {
                            let wire = codec.encode(&response).unwrap();
                            stream.write_all(&wire).await.unwrap();
                        }
                    }
                }
            });
        }
    });

    (addr, accepted)
}

fn mllp_ack(message: StructuredMessage) -> Option<StructuredMessage> {
    let body = message.as_text().unwrap_or_default().to_string();
    Some(StructuredMessage::xml(format!("<Ack>{}</Ack>", body)))
}

fn local_definition(id: &str, addr: SocketAddr) -> ConnectionDefinition {
    let mut definition = ConnectionDefinition::new(
        id,
        EndpointConfig::Static {
            host: "127.0.0.1".to_string(),
            port: addr.port(),
        },
    );
    definition.listen_timeout_ms = 2_000;
    definition
}

async fn running_manager(definition: ConnectionDefinition) -> ConnectionManager {
    let manager = ConnectionManager::tcp(None);
    manager.connection_updated(definition).await.unwrap();
    manager.start().await.unwrap();
    manager
}

#[tokio::test]
async fn test_mllp_request_response_with_reuse() {
    let (addr, accepted) = spawn_peer(CodecConfiguration::Mllp(MllpConfig::default()), mllp_ack).await;
    let manager = running_manager(local_definition("lab", addr)).await;
    let lab = ConnectionId::new("lab");

    let first = manager
        .send_message(&lab, &StructuredMessage::xml("<Order n=\"1\"/>"), None, None)
        .await
        .unwrap();
    assert_eq!(first.bytes.as_deref(), Some(&b"<Ack><Order n=\"1\"/></Ack>"[..]));

    let second = manager
        .send_message(
            &lab,
            &StructuredMessage::xml("<Order n=\"2\"/>"),
            Some(&first.session_id.to_string()),
            None,
        )
        .await
        .unwrap();
    assert_eq!(second.session_id, first.session_id);
    assert_eq!(second.bytes.as_deref(), Some(&b"<Ack><Order n=\"2\"/></Ack>"[..]));
    assert_eq!(accepted.load(Ordering::SeqCst), 1);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_silent_peer_yields_empty_response() {
    let (addr, _accepted) = spawn_peer(CodecConfiguration::Mllp(MllpConfig::default()), |_| None).await;
    let mut definition = local_definition("quiet", addr);
    definition.listen_timeout_ms = 100;
    let manager = running_manager(definition).await;

    let response = manager
        .send_message(&ConnectionId::new("quiet"), &StructuredMessage::xml("<Ping/>"), None, None)
        .await
        .unwrap();
    assert!(response.bytes.is_none());

    let runtime = manager.runtime(&ConnectionId::new("quiet")).await.unwrap();
    assert_eq!(runtime.stats().await.sessions, 1);
    manager.shutdown().await;
}

#[tokio::test]
async fn test_out_only_without_keep_alive_closes_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let peer = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        // Returns once the connector shuts the socket down
        stream.read_to_end(&mut received).await.unwrap();
        received
    });

    let mut definition = local_definition("fire", addr);
    definition.exchange_pattern = ExchangePattern::OutOnly;
    definition.keep_alive = false;
    let manager = running_manager(definition).await;

    let response = manager
        .send_message(&ConnectionId::new("fire"), &StructuredMessage::xml("<Event/>"), None, None)
        .await
        .unwrap();
    assert!(!response.has_response());

    let received = tokio::time::timeout(Duration::from_secs(5), peer)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, b"\x0b<Event/>\x1c\x0d");
}

#[tokio::test]
async fn test_iso8583_exchange() {
    let iso = Iso8583Config {
        schema: vec![
            FieldDefinition::new(2, FieldFormat::llvar(19, FieldContent::Numeric)),
            FieldDefinition::new(3, FieldFormat::numeric(6)),
            FieldDefinition::new(4, FieldFormat::numeric(12)),
            FieldDefinition::new(39, FieldFormat::alpha(2)),
            FieldDefinition::new(41, FieldFormat::alpha(16)),
        ],
        ..Default::default()
    };
    let (addr, _accepted) = spawn_peer(CodecConfiguration::Iso8583(iso.clone()), |request| {
        let parsed = Iso8583Message::from_xml(request.as_text()?).ok()?;
        let response = Iso8583Message::new("0210")
            .with_field(3, parsed.field(3)?.to_string())
            .with_field(4, parsed.field(4)?.to_string())
            .with_field(39, "00")
            .with_field(41, parsed.field(41)?.to_string());
        Some(StructuredMessage::xml(response.to_xml()))
    })
    .await;

    let mut definition = local_definition("cards", addr);
    definition.codec = CodecConfiguration::Iso8583(iso);
    let manager = running_manager(definition).await;

    let request = Iso8583Message::new("0200")
        .with_field(2, "411111")
        .with_field(3, "003000")
        .with_field(4, "000000012500")
        .with_field(41, "POS-TERMINAL-001");
    let response = manager
        .send_message(
            &ConnectionId::new("cards"),
            &StructuredMessage::xml(request.to_xml()),
            None,
            None,
        )
        .await
        .unwrap();

    let text = std::str::from_utf8(response.bytes.as_deref().unwrap()).unwrap();
    let reply = Iso8583Message::from_xml(text).unwrap();
    assert_eq!(reply.mti(), "0210");
    assert_eq!(reply.field(39), Some("00"));
    assert_eq!(reply.field(4), Some("000000012500"));
    manager.shutdown().await;
}

#[tokio::test]
async fn test_connect_refused_leaves_pool_empty() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut definition = ConnectionDefinition::new(
        "down",
        EndpointConfig::Static {
            host: "127.0.0.1".to_string(),
            port,
        },
    );
    definition.socket.connect_timeout_ms = 1_000;
    let manager = running_manager(definition).await;

    let err = manager
        .send_message(&ConnectionId::new("down"), &StructuredMessage::xml("<X/>"), None, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConnectorError::Connection { .. } | ConnectorError::Timeout { .. }
    ));

    let runtime = manager.runtime(&ConnectionId::new("down")).await.unwrap();
    let stats = runtime.stats().await;
    assert_eq!(stats.sessions, 0);
    assert_eq!(stats.connects, 0);
}

#[tokio::test]
async fn test_gateway_config_with_service_records() {
    let (addr, accepted) = spawn_peer(CodecConfiguration::Mllp(MllpConfig::default()), mllp_ack).await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gateway.toml");
    std::fs::write(
        &path,
        format!(
            r#"
[[connections]]
id = "lab-results"
listen_timeout_ms = 2000

[connections.endpoint]
mode = "dns"
service = "hl7"
domain = "lab.test"

[connections.codec]
type = "mllp"

[[service_records]]
name = "_hl7._tcp.lab.test"
priority = 10
weight = 0
port = {port}
target = "127.0.0.1."
"#,
            port = addr.port()
        ),
    )
    .unwrap();

    let config = load_config(Some(path.as_path()), None).unwrap();
    let directory = Arc::new(StaticServiceDirectory::from_config(&config.service_records));
    let manager = ConnectionManager::tcp(Some(directory.clone() as Arc<dyn ServiceRecordLookup>));
    for definition in config.connections.clone() {
        manager.connection_updated(definition).await.unwrap();
    }
    manager.start().await.unwrap();

    let lab = ConnectionId::new("lab-results");
    let first = manager
        .send_message(&lab, &StructuredMessage::xml("<A/>"), None, None)
        .await
        .unwrap();
    manager
        .send_message(&lab, &StructuredMessage::xml("<B/>"), Some(&first.session_id.to_string()), None)
        .await
        .unwrap();

    assert_eq!(directory.lookup_count(), 1);
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    manager.shutdown().await;
}
