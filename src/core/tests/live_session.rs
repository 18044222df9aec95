use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use super::{add_server, harness};
use crate::core::fleet::Fleet;
use crate::interfaces::live::{
    ClientFrame, ClientRegistry, InboundMessage, OutboundEvent, handle_message, run_client_session,
};

struct Client {
    frames: mpsc::Sender<ClientFrame>,
    events: mpsc::Receiver<OutboundEvent>,
    session: JoinHandle<()>,
}

fn open_client(
    fleet: &Fleet,
    clients: &Arc<ClientRegistry>,
    client_id: &str,
    metrics_interval: Duration,
) -> Client {
    open_client_with_buffer(fleet, clients, client_id, metrics_interval, 64)
}

fn open_client_with_buffer(
    fleet: &Fleet,
    clients: &Arc<ClientRegistry>,
    client_id: &str,
    metrics_interval: Duration,
    outbound_buffer: usize,
) -> Client {
    let (frames, inbound) = mpsc::channel(16);
    let (outbound, events) = mpsc::channel(outbound_buffer);
    let session = tokio::spawn(run_client_session(
        fleet.clone(),
        clients.clone(),
        client_id.to_string(),
        ReceiverStream::new(inbound),
        outbound,
        metrics_interval,
    ));
    Client {
        frames,
        events,
        session,
    }
}

async fn next_event(events: &mut mpsc::Receiver<OutboundEvent>) -> OutboundEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event within deadline")
        .expect("channel open")
}

async fn send_text(client: &Client, text: &str) {
    client
        .frames
        .send(ClientFrame::Text(text.to_string()))
        .await
        .unwrap();
}

async fn finished(session: JoinHandle<()>) {
    tokio::time::timeout(Duration::from_secs(5), session)
        .await
        .expect("session ends within deadline")
        .unwrap();
}

#[tokio::test]
async fn server_list_is_the_first_frame() {
    let h = harness();
    let db = add_server(&h.fleet, "db1", "database").await;
    let clients = Arc::new(ClientRegistry::new());

    let mut client = open_client(&h.fleet, &clients, "c1", Duration::from_secs(3600));
    match next_event(&mut client.events).await {
        OutboundEvent::ServerList { servers } => {
            assert_eq!(servers.len(), 1);
            assert_eq!(servers[0].id, db.id);
            assert_eq!(servers[0].server_type, "database");
            assert!(!servers[0].connected);
        }
        other => panic!("expected server_list first, got {other:?}"),
    }
    assert!(clients.contains("c1").await);

    drop(client.frames);
    finished(client.session).await;
    assert_eq!(clients.count().await, 0);
}

#[tokio::test]
async fn replies_keep_request_order_alongside_metrics() {
    let h = harness();
    let db = add_server(&h.fleet, "db1", "database").await;
    let web = add_server(&h.fleet, "web1", "web").await;
    h.fleet.registry.connect(db.id).await.unwrap();
    let clients = Arc::new(ClientRegistry::new());

    let mut client = open_client(&h.fleet, &clients, "c1", Duration::from_millis(10));
    assert!(matches!(
        next_event(&mut client.events).await,
        OutboundEvent::ServerList { .. }
    ));

    // Let the metrics loop get going before the replies start interleaving.
    loop {
        if let OutboundEvent::ServerMetrics { server_id, .. } = next_event(&mut client.events).await
        {
            assert_eq!(server_id, db.id);
            break;
        }
    }

    let requests = [
        format!(r#"{{"type":"connect_server","server_id":{}}}"#, web.id),
        format!(r#"{{"type":"execute_command","server_id":{},"command":"ls"}}"#, web.id),
        format!(r#"{{"type":"disconnect_server","server_id":{}}}"#, web.id),
        r#"{"type":"get_server_list"}"#.to_string(),
    ];
    for request in &requests {
        send_text(&client, request).await;
    }

    let mut replies = Vec::new();
    while replies.len() < requests.len() {
        match next_event(&mut client.events).await {
            OutboundEvent::ServerMetrics { metrics, .. } => {
                assert!((0.0..=100.0).contains(&metrics.cpu_usage));
            }
            reply => replies.push(reply),
        }
    }

    assert_eq!(
        replies[0],
        OutboundEvent::ServerStatusUpdate {
            server_id: web.id,
            status: true,
            message: "Connected to web1".to_string(),
        }
    );
    assert_eq!(
        replies[1],
        OutboundEvent::CommandResult {
            server_id: web.id,
            success: true,
            message: "Command executed on web1".to_string(),
            output: "ran ls".to_string(),
        }
    );
    assert_eq!(
        replies[2],
        OutboundEvent::ServerStatusUpdate {
            server_id: web.id,
            status: false,
            message: "Disconnected from web1".to_string(),
        }
    );
    match &replies[3] {
        OutboundEvent::ServerList { servers } => {
            let connected: Vec<_> = servers.iter().map(|s| (s.id, s.connected)).collect();
            assert_eq!(connected, vec![(db.id, true), (web.id, false)]);
        }
        other => panic!("expected server_list, got {other:?}"),
    }

    drop(client.frames);
    finished(client.session).await;
}

#[tokio::test]
async fn malformed_message_closes_only_that_client() {
    let h = harness();
    add_server(&h.fleet, "db1", "database").await;
    let clients = Arc::new(ClientRegistry::new());

    let mut bad = open_client(&h.fleet, &clients, "bad", Duration::from_millis(10));
    let mut good = open_client(&h.fleet, &clients, "good", Duration::from_millis(10));
    next_event(&mut bad.events).await;
    next_event(&mut good.events).await;

    send_text(&bad, "{not json").await;
    finished(bad.session).await;
    assert!(!clients.contains("bad").await);

    send_text(&good, r#"{"type":"get_server_list"}"#).await;
    assert!(matches!(
        next_event(&mut good.events).await,
        OutboundEvent::ServerList { .. }
    ));
    assert!(clients.contains("good").await);

    drop(good.frames);
    finished(good.session).await;
}

#[tokio::test]
async fn unknown_message_type_closes_the_client() {
    let h = harness();
    let clients = Arc::new(ClientRegistry::new());
    let mut client = open_client(&h.fleet, &clients, "c1", Duration::from_secs(3600));
    next_event(&mut client.events).await;

    send_text(&client, r#"{"type":"reboot_everything"}"#).await;
    finished(client.session).await;
    assert_eq!(clients.count().await, 0);
}

#[tokio::test]
async fn reconnecting_client_id_evicts_the_older_session() {
    let h = harness();
    let clients = Arc::new(ClientRegistry::new());

    let mut first = open_client(&h.fleet, &clients, "c1", Duration::from_secs(3600));
    next_event(&mut first.events).await;
    let mut second = open_client(&h.fleet, &clients, "c1", Duration::from_secs(3600));
    next_event(&mut second.events).await;

    finished(first.session).await;
    assert!(clients.contains("c1").await);
    assert_eq!(clients.count().await, 1);

    second.frames.send(ClientFrame::Closed).await.unwrap();
    finished(second.session).await;
    assert_eq!(clients.count().await, 0);
}

#[tokio::test]
async fn evicting_a_client_that_stopped_reading_still_tears_down() {
    let h = harness();
    let db = add_server(&h.fleet, "db1", "database").await;
    h.fleet.registry.connect(db.id).await.unwrap();
    let clients = Arc::new(ClientRegistry::new());

    // Room for the server list only; metrics pushes then block on a full queue.
    let stalled = open_client_with_buffer(&h.fleet, &clients, "c1", Duration::from_millis(10), 1);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!stalled.session.is_finished());

    let mut fresh = open_client(&h.fleet, &clients, "c1", Duration::from_secs(3600));
    assert!(matches!(
        next_event(&mut fresh.events).await,
        OutboundEvent::ServerList { .. }
    ));

    finished(stalled.session).await;
    assert!(clients.contains("c1").await);
    assert_eq!(clients.count().await, 1);
    drop(stalled.events);

    drop(fresh.frames);
    finished(fresh.session).await;
    assert_eq!(clients.count().await, 0);
}

#[tokio::test]
async fn stalled_reader_blocks_replies_until_the_client_is_evicted() {
    let h = harness();
    let clients = Arc::new(ClientRegistry::new());

    let stalled = open_client_with_buffer(&h.fleet, &clients, "c1", Duration::from_secs(3600), 1);
    send_text(&stalled, r#"{"type":"get_server_list"}"#).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!stalled.session.is_finished());

    let fresh = open_client(&h.fleet, &clients, "c1", Duration::from_secs(3600));
    finished(stalled.session).await;

    fresh.frames.send(ClientFrame::Closed).await.unwrap();
    finished(fresh.session).await;
    drop(stalled.events);
}

#[tokio::test]
async fn failures_become_replies_not_errors() {
    let h = harness();
    let reply = handle_message(
        &h.fleet,
        InboundMessage::DisconnectServer {
            server_id: 99,
            force: false,
        },
    )
    .await;
    assert_eq!(
        reply,
        OutboundEvent::ServerStatusUpdate {
            server_id: 99,
            status: false,
            message: "Server 99 not found".to_string(),
        }
    );

    let db = add_server(&h.fleet, "db1", "database").await;
    h.transport.fail_next_opens(1);
    let reply = handle_message(
        &h.fleet,
        InboundMessage::ExecuteCommand {
            server_id: db.id,
            command: "ls".to_string(),
        },
    )
    .await;
    match reply {
        OutboundEvent::CommandResult {
            success, output, message, ..
        } => {
            assert!(!success);
            assert!(output.is_empty());
            assert!(message.contains("auto-reconnect failed"));
        }
        other => panic!("expected command_result, got {other:?}"),
    }
}
