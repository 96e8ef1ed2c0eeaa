//! End-to-end session tests against an in-process mock panel speaking the
//! basic-protocol wire format directly over loopback TCP.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use bosch_alarm_mode2::commands::cmd;
use bosch_alarm_mode2::transport::TcpOnlyProvider;
use bosch_alarm_mode2::{AreaStatus, ConnectionStatus, Credentials, LoadSelector, Panel, PanelConfig, PointStatus};

/// A WHAT_ARE_YOU reply for a Solution 2000 panel with nothing but
/// subscription format 1 enabled: no serial read, no text commands, no
/// alarm memory, no doors — keeps the handshake script short while still
/// exercising the synthesized-name and bitmap-status paths.
fn what_are_you_reply() -> Vec<u8> {
    let mut reply = vec![0u8; 56];
    reply[0] = 0x20; // Solution 2000
    reply[5] = 1; // protocol major
    reply[6] = 0; // protocol minor
    reply[30] = 0x02; // bitmask byte 7: subscription format 1
    reply
}

async fn read_request(stream: &mut TcpStream) -> (u8, Vec<u8>) {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await.unwrap();
    assert_eq!(header[0], 0x01, "test harness only speaks the basic protocol");
    let body_len = header[1] as usize;
    let mut body = vec![0u8; body_len];
    stream.read_exact(&mut body).await.unwrap();
    (body[0], body[1..].to_vec())
}

async fn write_ack(stream: &mut TcpStream) {
    stream.write_all(&[0x01, 0x01, 0xFC]).await.unwrap();
}

async fn write_nack(stream: &mut TcpStream, code: u8) {
    stream.write_all(&[0x01, 0x02, 0xFD, code]).await.unwrap();
}

async fn write_ack_with_data(stream: &mut TcpStream, data: &[u8]) {
    let mut frame = vec![0x01, (data.len() + 1) as u8, 0xFE];
    frame.extend_from_slice(data);
    stream.write_all(&frame).await.unwrap();
}

/// Drive the handshake through capability negotiation, authentication, the
/// full `LoadSelector::ALL` load, and subscription setup. Leaves the stream
/// positioned right after the SET_SUBSCRIPTION ack so callers can script
/// further exchanges (or just let the connection idle).
async fn serve_handshake(stream: &mut TcpStream) {
    let (code, _) = read_request(stream).await;
    assert_eq!(code, cmd::WHAT_ARE_YOU, "format-3 probe first");
    write_nack(stream, 0x07).await;

    let (code, _) = read_request(stream).await;
    assert_eq!(code, cmd::WHAT_ARE_YOU, "falls back to format-1");
    write_ack_with_data(stream, &what_are_you_reply()).await;

    let (code, payload) = read_request(stream).await;
    assert_eq!(code, cmd::LOGIN_REMOTE_USER);
    assert_eq!(payload, vec![0x12, 0x34, 0xFF, 0xFF], "S3: \"1234\" packs with F padding");
    write_ack(stream).await;

    let (code, _) = read_request(stream).await;
    assert_eq!(code, cmd::CONFIGURED_AREAS);
    write_ack_with_data(stream, &[0x80]).await; // area 1 enabled

    let (code, _) = read_request(stream).await;
    assert_eq!(code, cmd::CONFIGURED_POINTS);
    write_ack_with_data(stream, &[0x80]).await; // point 1 enabled

    let (code, _) = read_request(stream).await;
    assert_eq!(code, cmd::CONFIGURED_OUTPUTS);
    write_ack_with_data(stream, &[]).await; // no outputs configured

    let (code, payload) = read_request(stream).await;
    assert_eq!(code, cmd::AREA_STATUS);
    assert_eq!(payload, vec![0x00, 0x01]);
    write_ack_with_data(stream, &[0x00, 0x01, 0x04]).await; // area 1 disarmed

    let (code, payload) = read_request(stream).await;
    assert_eq!(code, cmd::POINT_STATUS);
    assert_eq!(payload, vec![0x00, 0x01]);
    write_ack_with_data(stream, &[0x00, 0x01, 0x03]).await; // point 1 normal

    let (code, _) = read_request(stream).await;
    assert_eq!(code, cmd::OUTPUT_STATUS);
    write_ack_with_data(stream, &[]).await; // nothing active

    let (code, payload) = read_request(stream).await;
    assert_eq!(code, cmd::RAW_HISTORY);
    assert_eq!(payload, vec![0xFF, 0xFF, 0xFF, 0xFF, 0xFF], "initial cursor is the all-ones seed");
    write_ack_with_data(stream, &[0x00, 0x00, 0x00, 0x00, 0x00]).await; // empty reply, seeds cursor

    let (code, _) = read_request(stream).await;
    assert_eq!(code, cmd::PANEL_SYSTEM_STATUS);
    write_ack_with_data(stream, &[0x00, 0x00, 0x00]).await; // no faults

    let (code, _) = read_request(stream).await;
    assert_eq!(code, cmd::SET_SUBSCRIPTION);
    write_ack(stream).await;
}

async fn connect_test_panel(addr: std::net::SocketAddr) -> Panel {
    let config = PanelConfig::new(
        addr,
        Credentials { installer_or_user_code: Some("1234".to_string()), automation_code: None },
    )
    .with_tls_provider(Arc::new(TcpOnlyProvider));
    Panel::connect(config, LoadSelector::ALL).await.unwrap()
}

#[tokio::test]
async fn connect_loads_entities_and_status_then_subscribes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        serve_handshake(&mut stream).await;
        // Hold the connection open; the notification reader task just
        // awaits more bytes that never arrive in this scenario.
        let mut idle = [0u8; 1];
        let _ = stream.read(&mut idle).await;
    });

    let panel = connect_test_panel(addr).await;

    assert_eq!(panel.connection_status().await, ConnectionStatus::Connected);
    panel
        .with_model(|model| {
            assert_eq!(model.areas.len(), 1);
            assert_eq!(model.areas[&1].status(), AreaStatus::Disarmed);
            assert_eq!(model.areas[&1].name, "AREA1");
            assert_eq!(model.points.len(), 1);
            assert_eq!(model.points[&1].status(), PointStatus::Normal);
            assert!(model.outputs.is_empty());
            assert!(model.doors.is_empty());
        })
        .await;
    assert!(panel.events().await.is_empty());

    panel.disconnect().await;
    assert_eq!(panel.connection_status().await, ConnectionStatus::Disconnected);

    server.abort();
}

#[tokio::test]
async fn area_disarm_sends_the_arm_action_and_area_bitmap() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        serve_handshake(&mut stream).await;

        let (code, payload) = read_request(&mut stream).await;
        assert_eq!(code, cmd::AREA_ARM);
        // Disarm action code 0x01, area 1 encoded as bit 7 of one byte.
        assert_eq!(payload, vec![0x01, 0x80]);
        write_ack(&mut stream).await;
    });

    let panel = connect_test_panel(addr).await;
    panel.area_disarm(1).await.unwrap();

    server.await.unwrap();
    panel.disconnect().await;
}

#[tokio::test]
async fn status_only_reconnect_selector_skips_entity_and_info_loads() {
    // Mirrors the supervisor's choice of `LoadSelector::STATUS_ONLY` once
    // entities are already populated: only status commands should fire.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let (code, _) = read_request(&mut stream).await;
        assert_eq!(code, cmd::WHAT_ARE_YOU);
        write_nack(&mut stream, 0x07).await;
        let (code, _) = read_request(&mut stream).await;
        assert_eq!(code, cmd::WHAT_ARE_YOU);
        write_ack_with_data(&mut stream, &what_are_you_reply()).await;

        let (code, _) = read_request(&mut stream).await;
        assert_eq!(code, cmd::LOGIN_REMOTE_USER);
        write_ack(&mut stream).await;

        // No CONFIGURED_AREAS/POINTS/OUTPUTS here: status-only skips entities.
        let (code, _) = read_request(&mut stream).await;
        assert_eq!(code, cmd::OUTPUT_STATUS);
        write_ack_with_data(&mut stream, &[]).await;

        let (code, payload) = read_request(&mut stream).await;
        assert_eq!(code, cmd::RAW_HISTORY);
        assert_eq!(payload, vec![0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        write_ack_with_data(&mut stream, &[0x00, 0x00, 0x00, 0x00, 0x00]).await;

        let (code, _) = read_request(&mut stream).await;
        assert_eq!(code, cmd::PANEL_SYSTEM_STATUS);
        write_ack_with_data(&mut stream, &[0x00, 0x00, 0x00]).await;

        let (code, _) = read_request(&mut stream).await;
        assert_eq!(code, cmd::SET_SUBSCRIPTION);
        write_ack(&mut stream).await;

        let mut idle = [0u8; 1];
        let _ = stream.read(&mut idle).await;
    });

    let config = PanelConfig::new(
        addr,
        Credentials { installer_or_user_code: Some("1234".to_string()), automation_code: None },
    )
    .with_tls_provider(Arc::new(TcpOnlyProvider));
    let panel = Panel::connect(config, LoadSelector::STATUS_ONLY).await.unwrap();

    panel.with_model(|model| {
        assert!(model.areas.is_empty());
        assert!(model.points.is_empty());
    }).await;

    panel.disconnect().await;
    server.abort();
}
