use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use framebus::channel::{ChannelReceiver, ChannelSender};
use framebus::config::InferenceConfig;
use framebus::inference::{InferenceClient, InferenceRequest};
use framebus::message::Message;
use serde_json::json;
use url::Url;

fn wait_for(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    cond()
}

/// One canned HTTP exchange: status, JSON body, artificial latency.
#[derive(Clone)]
struct Canned {
    status: u16,
    body: String,
    delay: Duration,
}

fn ok(text: &str, delay: Duration) -> Canned {
    Canned {
        status: 200,
        body: format!(
            r#"{{"model":"test-model","created_at":"2024-01-01T00:00:00Z","response":"{text}","done":true}}"#
        ),
        delay,
    }
}

fn server_error() -> Canned {
    Canned {
        status: 500,
        body: r#"{"error":"model exploded"}"#.to_string(),
        delay: Duration::ZERO,
    }
}

/// Minimal HTTP server standing in for the completion backend. Serves
/// the scripted exchanges in order, repeating the last one.
fn spawn_backend(script: Vec<Canned>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind backend listener");
    let addr = listener.local_addr().expect("backend addr");
    thread::spawn(move || {
        let mut remaining: VecDeque<Canned> = script.into();
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            let canned = if remaining.len() > 1 {
                remaining.pop_front().expect("script not empty")
            } else {
                remaining.front().expect("script not empty").clone()
            };
            serve_one(stream, canned);
        }
    });
    addr
}

fn serve_one(mut stream: TcpStream, canned: Canned) {
    let mut request = Vec::new();
    let mut buf = [0u8; 8192];
    while !request_complete(&request) {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }
    thread::sleep(canned.delay);
    let status_line = match canned.status {
        200 => "200 OK",
        _ => "500 Internal Server Error",
    };
    let reply = format!(
        "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        canned.body.len(),
        canned.body
    );
    let _ = stream.write_all(reply.as_bytes());
}

fn request_complete(request: &[u8]) -> bool {
    let Some(headers_end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let headers = String::from_utf8_lossy(&request[..headers_end]);
    let content_length = headers
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    request.len() >= headers_end + 4 + content_length
}

fn backend_config(addr: SocketAddr) -> InferenceConfig {
    InferenceConfig {
        url: Url::parse(&format!("http://{addr}")).expect("backend url"),
        model: "test-model".into(),
        interval_secs: 3.0,
        timeout_secs: 10,
    }
}

#[test]
fn test_fan_out_to_every_receiver_on_the_port() {
    let mut rx_a = ChannelReceiver::new(29471);
    let mut rx_b = ChannelReceiver::new(29471);
    let mut rx_other = ChannelReceiver::new(29472);
    let mut sender = ChannelSender::new(29471);

    let mut got_a = None;
    let mut got_b = None;
    // delivery is best effort, so keep publishing until both have it
    let delivered = wait_for(
        || {
            sender.send(&Message::text("scene change"));
            thread::sleep(Duration::from_millis(30));
            got_a = got_a.take().or_else(|| rx_a.poll());
            got_b = got_b.take().or_else(|| rx_b.poll());
            got_a.is_some() && got_b.is_some()
        },
        Duration::from_secs(5),
    );

    assert!(delivered, "both receivers should see the broadcast");
    assert_eq!(got_a, Some(Message::text("scene change")));
    assert_eq!(got_b, Some(Message::text("scene change")));
    assert_eq!(rx_other.poll(), None, "other ports stay silent");
}

#[test]
fn test_structured_payload_over_the_wire() {
    let mut receiver = ChannelReceiver::new(29474);
    let mut sender = ChannelSender::new(29474);

    let payload = match json!({"scene": "harbour at dusk", "tags": ["boat", "fog"]}) {
        serde_json::Value::Object(fields) => fields,
        _ => unreachable!(),
    };
    let sent = Message::structured(payload);

    let mut got = None;
    let delivered = wait_for(
        || {
            sender.send(&sent);
            thread::sleep(Duration::from_millis(30));
            got = got.take().or_else(|| receiver.poll());
            got.is_some()
        },
        Duration::from_secs(5),
    );

    assert!(delivered);
    assert_eq!(got, Some(sent));
}

#[test]
fn test_single_flight_and_latest_response() {
    let addr = spawn_backend(vec![ok("a cat on a couch", Duration::from_secs(1))]);
    let client = InferenceClient::new(backend_config(addr)).expect("client builds");

    assert!(client.should_submit(Duration::from_secs(3)), "cold start");
    assert!(client.submit(InferenceRequest::new("cat")));

    assert!(!client.submit(InferenceRequest::new("dropped")), "second submit is a no-op while in flight");
    assert_eq!(client.last_response(), None, "nothing completed yet");

    assert!(wait_for(
        || client.last_response().is_some(),
        Duration::from_secs(5)
    ));
    assert_eq!(client.last_response().as_deref(), Some("a cat on a couch"));
    assert!(!client.is_in_flight());
    assert!(client.last_error().is_none());
}

#[test]
fn test_failure_keeps_the_last_good_response() {
    let addr = spawn_backend(vec![ok("first answer", Duration::ZERO), server_error()]);
    let client = InferenceClient::new(backend_config(addr)).expect("client builds");

    assert!(client.submit(InferenceRequest::new("one")));
    assert!(wait_for(
        || client.last_response().is_some(),
        Duration::from_secs(5)
    ));

    assert!(client.submit(InferenceRequest::new("two")));
    assert!(wait_for(|| !client.is_in_flight(), Duration::from_secs(5)));

    assert!(client.last_error().is_some(), "the failure is inspectable");
    assert_eq!(
        client.last_response().as_deref(),
        Some("first answer"),
        "a stale answer beats no answer"
    );
}

#[test]
fn test_callback_relays_response_onto_a_channel() {
    let addr = spawn_backend(vec![ok("neon alley in the rain", Duration::ZERO)]);
    let client = InferenceClient::new(backend_config(addr)).expect("client builds");

    let mut receiver = ChannelReceiver::new(29475);
    let relay = Arc::new(Mutex::new(ChannelSender::new(29475)));

    let tx = Arc::clone(&relay);
    assert!(client.submit(InferenceRequest::new("describe").with_callback(
        Arc::new(move |text| {
            tx.lock().expect("relay lock").send(&Message::text(text));
        })
    )));

    let mut got = None;
    let delivered = wait_for(
        || {
            got = got.take().or_else(|| receiver.poll());
            got.is_some()
        },
        Duration::from_secs(5),
    );

    assert!(delivered, "completion should be rebroadcast on the channel");
    assert_eq!(got, Some(Message::text("neon alley in the rain")));
}
