//! End-to-end debugger pipeline: a record arriving on the IPC hub comes out
//! of the DevTools endpoint as four `Network.*` frames under one request id.

use futures_util::StreamExt;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};

use netlens_core::headers::HeaderPipe;
use netlens_core::record::RequestRecord;
use netlens_core::wire::{decode_line, encode_line, WireMessage};
use netlens_debugger::devtools::DevtoolsServer;
use netlens_debugger::hub;
use netlens_debugger::projector::{Projector, ProjectorOptions};

#[tokio::test]
async fn record_from_host_reaches_frontend_as_four_frames() {
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let (devtools, devtools_listener) = DevtoolsServer::bind(0).await.unwrap();
    let devtools_addr = devtools_listener.local_addr().unwrap();
    tokio::spawn(
        devtools
            .clone()
            .run(devtools_listener, shutdown_tx.subscribe()),
    );

    let hub_listener = hub::bind(0).await.unwrap();
    let hub_addr = hub_listener.local_addr().unwrap();
    let (records_tx, mut records_rx) = mpsc::unbounded_channel();
    tokio::spawn(hub::run(hub_listener, records_tx, shutdown_tx.subscribe()));

    // Record pump, as the debugger main wires it.
    let pump_devtools = devtools.clone();
    tokio::spawn(async move {
        let mut projector = Projector::new(ProjectorOptions::default());
        while let Some(record) = records_rx.recv().await {
            for frame in projector.project(&record) {
                pump_devtools.send_frame(&frame).await;
            }
        }
    });

    // Attach a front-end.
    let (mut frontend, _) = tokio_tungstenite::connect_async(format!("ws://{devtools_addr}"))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // Connect as a host and stream one completed record.
    let mut host = TcpStream::connect(hub_addr).await.unwrap();
    let (read_half, mut write_half) = host.split();
    let mut greeting = String::new();
    BufReader::new(read_half)
        .read_line(&mut greeting)
        .await
        .unwrap();
    assert!(matches!(
        decode_line(&greeting).unwrap(),
        WireMessage::Ready
    ));

    let mut record = RequestRecord::new(
        "http://example.com/a",
        "GET",
        HeaderPipe::new(),
        None,
    );
    record.status = Some(200);
    record.response_headers.set("content-type", "text/plain");
    record.response_body = Some("hello".into());
    record.encoded_data_length = 5;
    record.data_length = 5;
    record.finish();
    let expected_id = record.id.clone();

    let line = encode_line(&WireMessage::RequestEnd { record }).unwrap();
    write_half.write_all(line.as_bytes()).await.unwrap();

    // Exactly the four frames, in order, sharing the record's id.
    let expected = [
        "Network.requestWillBeSent",
        "Network.responseReceived",
        "Network.dataReceived",
        "Network.loadingFinished",
    ];
    let mut last_timestamp = 0.0f64;
    for method in expected {
        let message = frontend.next().await.unwrap().unwrap();
        let frame: Value = serde_json::from_str(message.to_text().unwrap()).unwrap();

        assert_eq!(frame["method"], method);
        assert_eq!(frame["params"]["requestId"], expected_id.as_str());

        let timestamp = frame["params"]["timestamp"].as_f64().unwrap();
        assert!(timestamp >= last_timestamp, "timestamps never go backward");
        last_timestamp = timestamp;
    }
}
