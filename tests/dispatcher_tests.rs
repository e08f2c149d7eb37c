//! Dispatcher tests: session limits, overflow policies, isolation.

use sotto::audio::AudioFormat;
use sotto::engine::pool::PoolConfig;
use sotto::engine::{EnginePool, MockEngine};
use sotto::protocol::codec::{Decoded, EventDecoder, encode};
use sotto::protocol::event::TranscribeData;
use sotto::protocol::Event;
use sotto::server::{BindUri, Listener, OverflowPolicy, Server, ServerConfig};
use sotto::session::SessionConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn start_server(engine: MockEngine, config: ServerConfig) -> SocketAddr {
    let pool = EnginePool::new(Arc::new(engine), PoolConfig::default());
    let server = Server::new(pool, config).unwrap();

    let uri = BindUri::Tcp("127.0.0.1:0".to_string());
    let listener = Listener::bind(&uri).await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        server.serve(listener, std::future::pending()).await.unwrap();
    });
    addr
}

fn small_window_config(max_sessions: usize, overflow: OverflowPolicy) -> ServerConfig {
    ServerConfig {
        uri: String::new(),
        max_sessions,
        overflow,
        queue_wait: Duration::from_secs(5),
        session: SessionConfig {
            window_ms: 100,
            default_language: None,
        },
    }
}

/// Read events until one arrives or the connection closes.
async fn read_event(stream: &mut TcpStream, decoder: &mut EventDecoder) -> Option<Event> {
    let mut buf = [0u8; 8192];
    loop {
        match decoder.next().unwrap() {
            Some(Decoded::Event(event)) => return Some(event),
            Some(Decoded::Invalid { .. }) => continue,
            None => {}
        }
        let n = stream.read(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        decoder.extend(&buf[..n]);
    }
}

#[tokio::test]
async fn test_reject_policy_admits_exactly_max_sessions() {
    // 50 connections against max-concurrency 10: exactly 10 proceed, the
    // other 40 are told why — never silently dropped.
    let addr = start_server(
        MockEngine::new("base"),
        small_window_config(10, OverflowPolicy::Reject),
    )
    .await;

    let mut tasks = Vec::new();
    for _ in 0..50 {
        tasks.push(tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            // A describe answers Info on admitted connections; rejected
            // ones get the Error event before anything is read from them.
            let _ = stream.write_all(&encode(&Event::Describe)).await;
            let _ = stream.flush().await;

            let mut decoder = EventDecoder::new();
            let first = read_event(&mut stream, &mut decoder).await;
            // Hold the connection (and its session slot) until every
            // outcome is counted.
            (first, stream)
        }));
    }

    let mut admitted = 0;
    let mut rejected = 0;
    let mut held = Vec::new();
    for task in tasks {
        let (first, stream) = task.await.unwrap();
        match first {
            Some(Event::Info(_)) => admitted += 1,
            Some(Event::Error(e)) => {
                assert_eq!(e.code, "resource-exhausted");
                rejected += 1;
            }
            other => panic!("unexpected first event: {other:?}"),
        }
        held.push(stream);
    }

    assert_eq!(admitted, 10);
    assert_eq!(rejected, 40);
}

#[tokio::test]
async fn test_queue_policy_serves_overflow_after_wait() {
    // Eight short sessions against max-concurrency 2: queued connections
    // wait for a slot instead of being rejected.
    let engine = MockEngine::new("base").with_response("ok");
    let addr = start_server(engine, small_window_config(2, OverflowPolicy::Queue)).await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        tasks.push(tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            let mut decoder = EventDecoder::new();

            stream
                .write_all(&encode(&Event::Transcribe(TranscribeData::default())))
                .await
                .unwrap();
            stream
                .write_all(&encode(&Event::AudioStart(AudioFormat::wire_default())))
                .await
                .unwrap();
            stream
                .write_all(&encode(&Event::AudioChunk(vec![0u8; 3200])))
                .await
                .unwrap();
            stream.write_all(&encode(&Event::AudioStop)).await.unwrap();
            stream.flush().await.unwrap();

            // Partial, then final; connection drops after, freeing the slot.
            loop {
                match read_event(&mut stream, &mut decoder).await {
                    Some(Event::Transcript(t)) if t.is_final => return true,
                    Some(Event::Transcript(_)) => continue,
                    other => panic!("unexpected event: {other:?}"),
                }
            }
        }));
    }

    for task in tasks {
        assert!(task.await.unwrap(), "every queued session must complete");
    }
}

#[tokio::test]
async fn test_queue_policy_rejects_after_bounded_wait() {
    let config = ServerConfig {
        queue_wait: Duration::from_millis(100),
        ..small_window_config(1, OverflowPolicy::Queue)
    };
    let addr = start_server(MockEngine::new("base"), config).await;

    // First connection occupies the only slot and stays open.
    let mut first = TcpStream::connect(addr).await.unwrap();
    first
        .write_all(&encode(&Event::Transcribe(TranscribeData::default())))
        .await
        .unwrap();
    first.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Second connection waits out the bounded queue, then is rejected.
    let mut second = TcpStream::connect(addr).await.unwrap();
    let mut decoder = EventDecoder::new();
    match read_event(&mut second, &mut decoder).await {
        Some(Event::Error(e)) => assert_eq!(e.code, "resource-exhausted"),
        other => panic!("expected rejection, got {other:?}"),
    }

    drop(first);
}

#[tokio::test]
async fn test_disconnect_leaves_no_dangling_engine_calls() {
    // A client that vanishes mid-stream must not cause further decode
    // calls for its session once the in-flight window completes.
    let engine = MockEngine::new("base").with_delay(Duration::from_millis(50));
    let shared = engine.clone();
    let addr = start_server(engine, small_window_config(4, OverflowPolicy::Reject)).await;

    {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(&encode(&Event::Transcribe(TranscribeData::default())))
            .await
            .unwrap();
        stream
            .write_all(&encode(&Event::AudioStart(AudioFormat::wire_default())))
            .await
            .unwrap();
        // One full window: triggers one decode call.
        stream
            .write_all(&encode(&Event::AudioChunk(vec![0u8; 3200])))
            .await
            .unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        // Vanish mid-stream, mid-decode.
    }

    // Let the in-flight call finish and the server notice the close.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let settled = shared.call_count();
    assert!(settled <= 1, "at most the in-flight call, got {settled}");

    // No new calls appear afterwards.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(shared.call_count(), settled);
}

#[tokio::test]
async fn test_one_failing_session_does_not_disturb_others() {
    let engine = MockEngine::new("base").with_response("fine");
    let addr = start_server(engine, small_window_config(4, OverflowPolicy::Reject)).await;

    // A connection that corrupts its stream and gets closed.
    let mut bad = TcpStream::connect(addr).await.unwrap();
    bad.write_all(b"garbage garbage\n").await.unwrap();
    bad.flush().await.unwrap();

    // A well-behaved connection at the same time.
    let mut good = TcpStream::connect(addr).await.unwrap();
    let mut decoder = EventDecoder::new();
    good.write_all(&encode(&Event::Describe)).await.unwrap();
    good.flush().await.unwrap();

    match read_event(&mut good, &mut decoder).await {
        Some(Event::Info(_)) => {}
        other => panic!("healthy session disturbed: {other:?}"),
    }
}
