use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{Local, TimeDelta, TimeZone};
use image::{DynamicImage, Rgb, RgbImage};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use camlink::capture::CaptureScheduler;
use camlink::client::{StreamingClient, TcpConnector, TransportSession};
use camlink::codecs::{FrameCodec, JpegCodec};
use camlink::core::ManualClock;
use camlink::framing::frame;
use camlink::recorder::sink_avi::read_avi_info;
use camlink::recorder::{RecorderConfig, RetentionRing};
use camlink::server::{serve, ConnectionHandler, ServerContext, ServerStatus};
use camlink::testing::mocks::{MemorySource, ScriptedAcceptor};

fn context(dir: &std::path::Path) -> ServerContext {
    ServerContext {
        retention: Arc::new(RetentionRing::new(dir.to_path_buf(), 8).unwrap()),
        clock: Arc::new(ManualClock::new(Local.with_ymd_and_hms(2024, 6, 1, 23, 15, 0).unwrap())),
        recorder: RecorderConfig {
            rotation_interval: TimeDelta::minutes(60),
            fps: 10,
        },
        idle_timeout: Duration::from_secs(5),
        max_pending: 1 << 20,
        preview: None,
        status: Arc::new(ServerStatus::default()),
    }
}

fn jpeg(shade: u8) -> Vec<u8> {
    let img = RgbImage::from_pixel(120, 90, Rgb([shade, shade, 255 - shade]));
    JpegCodec.encode(&DynamicImage::ImageRgb8(img)).unwrap()
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..200 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn corrupt_frame_in_the_middle_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path());
    let (mut client, server) = tokio::io::duplex(256 * 1024);

    let mut wire = frame(&jpeg(10));
    wire.extend(frame(b"\xff\xd8\xff\xe0 this is not an image"));
    wire.extend(frame(&jpeg(200)));

    let running = Arc::new(AtomicBool::new(true));
    let handler = tokio::spawn(ConnectionHandler::new("bad-frame", ctx.clone()).run(server, running));

    client.write_all(&wire).await.unwrap();
    // Verbindung lebt noch: weiterer Frame kommt durch
    client.write_all(&frame(&jpeg(90))).await.unwrap();
    drop(client);

    let stats = handler.await.unwrap().unwrap();
    assert_eq!(stats.received, 4);
    assert_eq!(stats.persisted, 3);
    assert_eq!(stats.decode_failures, 1);

    let files = ctx.retention.entries().unwrap();
    assert_eq!(files.len(), 1);
    let info = read_avi_info(&files[0]).unwrap();
    assert_eq!((info.frames, info.width, info.height), (3, 120, 90));
}

#[tokio::test]
async fn client_to_server_over_tcp() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path());
    let status = ctx.status.clone();
    let retention = ctx.retention.clone();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let server_running = Arc::new(AtomicBool::new(true));
    let server = tokio::spawn(serve(listener, ctx, server_running.clone()));

    let client_running = Arc::new(AtomicBool::new(true));
    let session = TransportSession::new(
        TcpConnector::new(&addr, Duration::from_secs(2)),
        Duration::from_millis(50),
        client_running.clone(),
    );
    let mut client = StreamingClient::new(
        session,
        Box::new(MemorySource::solid(64, 48, 3).failing_after(5)),
        CaptureScheduler::always(),
        client_running,
    );

    // fünf Frames, dann meldet die Quelle einen Ausfall
    assert!(client.run().await.is_err());
    assert_eq!(client.stats().frames_sent, 5);
    drop(client);

    wait_until(|| status.frames.persisted.load(Ordering::Relaxed) == 5).await;
    assert_eq!(status.connections_total.load(Ordering::Relaxed), 1);
    wait_until(|| status.active_connections.load(Ordering::Relaxed) == 0).await;

    server_running.store(false, Ordering::SeqCst);
    server.await.unwrap().unwrap();

    let files = retention.entries().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(read_avi_info(&files[0]).unwrap().frames, 5);
}

#[tokio::test]
async fn shutdown_finalizes_open_connections() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path());
    let retention = ctx.retention.clone();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let running = Arc::new(AtomicBool::new(true));
    let server = tokio::spawn(serve(listener, ctx, running.clone()));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&frame(&jpeg(1))).await.unwrap();
    stream.write_all(&frame(&jpeg(2))).await.unwrap();
    stream.flush().await.unwrap();

    wait_until(|| {
        retention
            .entries()
            .map(|files| files.len() == 1)
            .unwrap_or(false)
    })
    .await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Verbindung bleibt offen, Server fährt herunter
    running.store(false, Ordering::SeqCst);
    server.await.unwrap().unwrap();

    let files = retention.entries().unwrap();
    assert_eq!(read_avi_info(&files[0]).unwrap().frames, 2);
    drop(stream);
}

#[tokio::test]
async fn failed_accept_does_not_lock_out_new_cameras() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path());
    let status = ctx.status.clone();
    let retention = ctx.retention.clone();

    let (acceptor, incoming) = ScriptedAcceptor::new();
    let running = Arc::new(AtomicBool::new(true));
    let server = tokio::spawn(serve(acceptor, ctx, running.clone()));

    // Kamera A streamt und bleibt verbunden
    let (mut cam_a, far_a) = tokio::io::duplex(256 * 1024);
    incoming.send(Ok(far_a)).unwrap();
    cam_a.write_all(&frame(&jpeg(30))).await.unwrap();
    wait_until(|| status.frames.persisted.load(Ordering::Relaxed) == 1).await;

    incoming
        .send(Err(io::Error::other("Too many open files (os error 24)")))
        .unwrap();

    let (mut cam_c, far_c) = tokio::io::duplex(256 * 1024);
    incoming.send(Ok(far_c)).unwrap();
    cam_c.write_all(&frame(&jpeg(150))).await.unwrap();
    drop(cam_c);

    wait_until(|| {
        status.connections_total.load(Ordering::Relaxed) == 2
            && status.active_connections.load(Ordering::Relaxed) == 1
    })
    .await;
    assert_eq!(status.frames.persisted.load(Ordering::Relaxed), 2);
    assert!(!server.is_finished());
    assert_eq!(retention.entries().unwrap().len(), 2);

    running.store(false, Ordering::SeqCst);
    server.await.unwrap().unwrap();
    drop(cam_a);

    for file in retention.entries().unwrap() {
        assert_eq!(read_avi_info(&file).unwrap().frames, 1);
    }
}
