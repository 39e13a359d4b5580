//! Hex traffic mirror fidelity against the real wire bytes.

use std::sync::Arc;

use bandlink::{Device, EngineConfig, MockBand};
use bandlink_tests::SharedSink;

async fn ready_device(band: &Arc<MockBand>) -> Device {
    bandlink_tests::init_tracing();
    let device = Device::open(band.clone(), EngineConfig::default())
        .await
        .expect("open session");
    device.handshake().await.expect("handshake");
    device
}

#[tokio::test(start_paused = true)]
async fn one_exchange_produces_two_matching_lines() {
    let band = Arc::new(MockBand::new());
    let device = ready_device(&band).await;

    let sink = SharedSink::default();
    device.attach_traffic_log(Box::new(sink.clone()));
    device.technical_status().await.unwrap();
    device.detach_traffic_log().unwrap();

    let lines = sink.lines();
    assert_eq!(lines.len(), 2, "one outbound, one inbound: {lines:?}");

    // The hex content is byte-exact against what crossed the transport.
    let sent = band.wire_from_host();
    let received = band.wire_to_host();
    assert_eq!(
        lines[0],
        format!(">> {}", hex::encode(sent.last().unwrap()))
    );
    assert_eq!(
        lines[1],
        format!("<< {}", hex::encode(received.last().unwrap()))
    );
}

#[tokio::test(start_paused = true)]
async fn lines_stay_in_send_receive_order() {
    let band = Arc::new(MockBand::new());
    let device = ready_device(&band).await;

    let sink = SharedSink::default();
    device.attach_traffic_log(Box::new(sink.clone()));
    device.set_leds(1).await.unwrap();
    device.set_leds(0).await.unwrap();
    device.detach_traffic_log().unwrap();

    let lines = sink.lines();
    let directions: Vec<&str> = lines
        .iter()
        .map(|l| if l.starts_with(">>") { ">>" } else { "<<" })
        .collect();
    assert_eq!(directions, vec![">>", "<<", ">>", "<<"]);
}

#[tokio::test(start_paused = true)]
async fn fragmented_responses_log_each_received_buffer() {
    let band = Arc::new(MockBand::new());
    let device = ready_device(&band).await;

    // The radio delivers the response in 10-byte notifications; every one
    // of them is mirrored, and together they are the full frame.
    band.set_fragment_size(10);

    let sink = SharedSink::default();
    device.attach_traffic_log(Box::new(sink.clone()));
    device.technical_status().await.unwrap();
    device.detach_traffic_log().unwrap();

    let lines = sink.lines();
    assert!(lines[0].starts_with(">> "));

    let inbound_hex: String = lines[1..]
        .iter()
        .map(|l| l.strip_prefix("<< ").expect("inbound line"))
        .collect();
    let full_response = band.wire_to_host().pop().unwrap();
    assert_eq!(inbound_hex, hex::encode(full_response));
}

#[tokio::test(start_paused = true)]
async fn detach_hands_the_sink_back_and_goes_quiet() {
    let band = Arc::new(MockBand::new());
    let device = ready_device(&band).await;

    let sink = SharedSink::default();
    device.attach_traffic_log(Box::new(sink.clone()));
    device.set_leds(1).await.unwrap();
    let returned = device.detach_traffic_log();
    assert!(returned.is_some());

    let lines_before = sink.lines().len();
    device.set_leds(0).await.unwrap();
    assert_eq!(sink.lines().len(), lines_before, "detached log must stay silent");
}

#[tokio::test(start_paused = true)]
async fn handshake_traffic_is_mirrored_when_attached_from_the_start() {
    let band = Arc::new(MockBand::new());
    let device = Device::open(band.clone(), EngineConfig::default())
        .await
        .unwrap();

    let sink = SharedSink::default();
    device.attach_traffic_log(Box::new(sink.clone()));
    device.handshake().await.unwrap();

    let lines = sink.lines();
    // Identity request/response, then session start with its ACK and
    // response blob: three inbound buffers in total.
    assert_eq!(lines.iter().filter(|l| l.starts_with(">>")).count(), 2);
    assert_eq!(lines.iter().filter(|l| l.starts_with("<<")).count(), 3);
}
