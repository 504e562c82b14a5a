use pretty_assertions::assert_eq;
use scalelink_core::config::ConnectionConfig;
use scalelink_core::demo::DemoProvider;
use scalelink_core::protocol::{
    classify, decode, ConnectionState, DecodeSession, PortIdentity, ProtocolVariant,
    ScaleConnection, ScaleError, Weight,
};
use serialport::{DataBits, FlowControl, Parity, StopBits};
use std::time::Duration;

fn feed(session: &mut DecodeSession, chunks: &[&str]) -> Vec<Weight> {
    chunks
        .iter()
        .filter_map(|chunk| session.push(chunk.as_bytes()))
        .map(|reading| reading.weight)
        .collect()
}

#[test]
fn test_every_link_is_seven_even_one() {
    let identities = [
        PortIdentity::usb(1659, 9123),
        PortIdentity::usb(1659, 9124),
        PortIdentity::usb(0x0403, 0x6001),
        PortIdentity::default(),
    ];
    for identity in identities {
        let (_, params) = classify(&identity);
        assert_eq!(params.data_bits, DataBits::Seven, "{}", identity);
        assert_eq!(params.stop_bits, StopBits::One, "{}", identity);
        assert_eq!(params.parity, Parity::Even, "{}", identity);
        assert_eq!(params.flow_control, FlowControl::None, "{}", identity);
    }
}

#[test]
fn test_only_exact_legacy_identity_is_legacy() {
    let cases = [
        (PortIdentity::usb(1659, 9123), ProtocolVariant::Legacy, 1200),
        (PortIdentity::usb(1659, 9124), ProtocolVariant::Standard, 9600),
        (PortIdentity::usb(1658, 9123), ProtocolVariant::Standard, 9600),
        (PortIdentity::default(), ProtocolVariant::Standard, 9600),
    ];
    for (identity, variant, baud) in cases {
        let (got, params) = classify(&identity);
        assert_eq!(got, variant, "{}", identity);
        assert_eq!(params.baud_rate, baud, "{}", identity);
    }
}

#[test]
fn test_legacy_frame_split_across_reads() {
    let mut session = DecodeSession::new(ProtocolVariant::Legacy);
    let weights = feed(&mut session, &["\x02+00", "01", "23\r\n"]);
    assert_eq!(weights, vec![Weight::Units(123)]);
}

#[test]
fn test_legacy_later_frames_supersede() {
    let mut session = DecodeSession::new(ProtocolVariant::Legacy);
    let weights = feed(
        &mut session,
        &["+000100\r\n", "+000200\r\n+000300\r\n", "noise"],
    );
    assert_eq!(weights, vec![Weight::Units(100), Weight::Units(300)]);
}

#[test]
fn test_legacy_buffer_stays_bounded_without_frames() {
    let mut session = DecodeSession::with_buffer_limit(ProtocolVariant::Legacy, 64);
    for _ in 0..100 {
        assert!(session.push(b"garbage without a frame").is_none());
        assert!(session.buffered().len() <= 64);
    }
    // A frame straddling the trim point still decodes
    assert!(session.push(b"xx+0001").is_none());
    let reading = session.push(b"23").unwrap();
    assert_eq!(reading.weight, Weight::Units(123));
}

#[test]
fn test_standard_chunks_are_independent() {
    let mut session = DecodeSession::new(ProtocolVariant::Standard);
    let weights = feed(&mut session, &["01", "500", "01500", "-5", "0000"]);
    assert_eq!(
        weights,
        vec![Weight::Scaled(0.001), Weight::Scaled(0.5), Weight::Scaled(1.5)]
    );
}

#[test]
fn test_standard_display_rounding() {
    let mut buffer = "  2500 ".to_string();
    let weight = decode(&mut buffer, ProtocolVariant::Standard).unwrap();
    assert_eq!(weight, Weight::Scaled(2.5));
    assert_eq!(weight.to_string(), "3");
}

#[tokio::test(start_paused = true)]
async fn test_demo_legacy_scale_end_to_end() {
    let provider = DemoProvider::new(ProtocolVariant::Legacy)
        .with_tick(Duration::from_millis(100))
        .with_seed(42);
    let mut conn = ScaleConnection::new(provider, ConnectionConfig::default());
    let mut weights = conn.watch_weight();

    conn.connect().await.unwrap();
    assert_eq!(conn.state(), ConnectionState::Reading);
    assert_eq!(conn.variant(), Some(ProtocolVariant::Legacy));

    tokio::time::timeout(Duration::from_secs(60), weights.changed())
        .await
        .expect("no weight from demo scale")
        .unwrap();
    let reading = weights.borrow_and_update().unwrap();
    assert!(matches!(reading.weight, Weight::Units(_)));

    conn.disconnect().await;
    assert_eq!(conn.state(), ConnectionState::Disconnected);
    assert!(conn.weight().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_demo_standard_scale_end_to_end() {
    let provider = DemoProvider::new(ProtocolVariant::Standard)
        .with_tick(Duration::from_millis(100))
        .with_seed(42);
    let mut conn = ScaleConnection::new(provider, ConnectionConfig::default());
    let mut weights = conn.watch_weight();

    conn.connect().await.unwrap();
    assert_eq!(conn.variant(), Some(ProtocolVariant::Standard));

    tokio::time::timeout(Duration::from_secs(60), weights.changed())
        .await
        .expect("no weight from demo scale")
        .unwrap();
    let reading = weights.borrow_and_update().unwrap();
    assert!(matches!(reading.weight, Weight::Scaled(_)));
    assert!(reading.weight.value() > 0.0);

    conn.disconnect().await;
    conn.disconnect().await;
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}

#[test]
fn test_scale_error_display() {
    assert_eq!(
        ScaleError::PortNotFound("/dev/ttyUSB9".to_string()).to_string(),
        "Port not found: /dev/ttyUSB9"
    );
    assert!(ScaleError::SelectionCancelled.to_string().contains("cancelled"));
}
