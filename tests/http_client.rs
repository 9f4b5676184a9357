use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use zone_console::api::{is_unreachable, ApiClient, BeamAction};
use zone_console::store::{InMemoryZoneCache, LoadOutcome, ZoneCache, ZoneRemote, ZoneStore, CACHE_KEY};
use zone_console::{ImageSource, ZoneError};

// ---- Scripted backend ----

struct Reply {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
}

impl Reply {
    fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.as_bytes().to_vec(),
        }
    }
}

#[derive(Debug)]
struct Recorded {
    method: String,
    raw_path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

/// Answers one connection per scripted reply, in order, then exits.
fn serve(replies: Vec<Reply>) -> (String, mpsc::Receiver<Recorded>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let base = format!("http://{}", listener.local_addr().expect("addr"));
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for reply in replies {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let Ok(request) = read_request(&mut stream) else {
                return;
            };
            let _ = tx.send(request);
            let _ = write_response(&mut stream, &reply);
        }
    });
    (base, rx)
}

fn read_request(stream: &mut TcpStream) -> std::io::Result<Recorded> {
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let mut buf = [0u8; 4096];
    let mut data = Vec::new();
    let header_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let text = String::from_utf8_lossy(&data[..header_end]).to_string();
    let mut lines = text.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let raw_path = parts.next().unwrap_or_default().to_string();
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }
    let length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = data[header_end..].to_vec();
    while body.len() < length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }
    Ok(Recorded {
        method,
        raw_path,
        headers,
        body,
    })
}

fn write_response(stream: &mut TcpStream, reply: &Reply) -> std::io::Result<()> {
    let status_line = match reply.status {
        200 => "HTTP/1.1 200 OK",
        201 => "HTTP/1.1 201 Created",
        404 => "HTTP/1.1 404 Not Found",
        422 => "HTTP/1.1 422 Unprocessable Entity",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status_line,
        reply.content_type,
        reply.body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(&reply.body)?;
    stream.flush()
}

fn client(base: &str) -> ApiClient {
    ApiClient::new(base, Duration::from_secs(5)).expect("client")
}

const ZONES_JSON: &str = r##"[
    {"id": "1", "name": "Dock", "coordinates": [{"x": 0, "y": 0}, {"x": 100, "y": 0}, {"x": 100, "y": 100}], "priority": 3, "color": "#00FF00"},
    {"id": "2", "name": "Gate", "coordinates": [{"x": 5, "y": 5}, {"x": 50, "y": 5}, {"x": 50, "y": 50}]}
]"##;

// ---- Zones ----

#[test]
fn lists_zones_with_backend_defaults() {
    let (base, rx) = serve(vec![Reply::json(200, ZONES_JSON)]);
    let mut api = client(&base);
    let zones = api.list_zones().expect("list");
    assert_eq!(zones.len(), 2);
    assert_eq!(zones[0].priority, 3);
    assert_eq!(zones[1].priority, 1);
    assert_eq!(zones[1].color, "#FF0000");

    let request = rx.recv().unwrap();
    assert_eq!(request.method, "GET");
    assert_eq!(request.raw_path, "/api/zones");
}

#[test]
fn create_posts_zone_json() {
    let (base, rx) = serve(vec![Reply::json(200, r#"{"status":"ok"}"#)]);
    let mut api = client(&base);
    let zone: zone_console::Zone = serde_json::from_str(
        r#"{"id": "9", "name": "Lobby", "coordinates": [{"x": 1, "y": 2}, {"x": 3, "y": 4}, {"x": 5, "y": 6}]}"#,
    )
    .unwrap();
    api.create_zone(&zone).expect("create");

    let request = rx.recv().unwrap();
    assert_eq!(request.method, "POST");
    assert_eq!(request.raw_path, "/api/zones");
    assert!(request.headers["content-type"].starts_with("application/json"));
    let sent: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(sent["name"], "Lobby");
    assert_eq!(sent["coordinates"][2]["y"], 6.0);
    assert_eq!(sent["min_area"], 500);
}

#[test]
fn existence_check_maps_status_to_false() {
    let (base, rx) = serve(vec![
        Reply::json(200, r#"{"id":"1"}"#),
        Reply::json(404, r#"{"detail":"not found"}"#),
        Reply::json(500, ""),
    ]);
    let mut api = client(&base);
    assert!(api.zone_exists("1").unwrap());
    assert!(!api.zone_exists("2").unwrap());
    assert!(!api.zone_exists("3").unwrap());
    let paths: Vec<String> = rx.iter().take(3).map(|r| r.raw_path).collect();
    assert_eq!(paths, ["/api/zones/1", "/api/zones/2", "/api/zones/3"]);
}

#[test]
fn delete_uses_delete_verb_and_reports_status_body() {
    let (base, rx) = serve(vec![
        Reply::json(200, "{}"),
        Reply::json(422, r#"{"detail":"zone locked"}"#),
    ]);
    let mut api = client(&base);
    api.delete_zone("7").expect("delete");
    let err = api.delete_zone("8").unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("HTTP 422"));
    assert!(message.contains("zone locked"));
    assert!(!is_unreachable(&err));

    let first = rx.recv().unwrap();
    assert_eq!(first.method, "DELETE");
    assert_eq!(first.raw_path, "/api/zones/7");
}

#[test]
fn refused_connection_is_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    let mut api = client(&base);
    let err = api.list_zones().unwrap_err();
    assert!(is_unreachable(&err));
    assert!(api.zone_exists("1").is_err());
}

#[test]
fn store_falls_back_to_cache_and_prunes() {
    let (base, rx) = serve(vec![
        Reply::json(500, "database offline"),
        Reply::json(200, "{}"),
        Reply::json(404, ""),
    ]);
    let mut cache = InMemoryZoneCache::new();
    cache.write(CACHE_KEY, ZONES_JSON).unwrap();
    let mut store = ZoneStore::new(client(&base), cache);

    let zones = store.load_zones();
    assert_eq!(zones.len(), 1);
    assert_eq!(zones[0].name, "Dock");
    assert_eq!(
        store.last_load(),
        Some(LoadOutcome::Cache { kept: 1, pruned: 1 })
    );
    let cached = store.cache_mut().read(CACHE_KEY).unwrap().unwrap();
    assert!(!cached.contains("Gate"));

    let paths: Vec<String> = rx.iter().take(3).map(|r| r.raw_path).collect();
    assert_eq!(paths, ["/api/zones", "/api/zones/1", "/api/zones/2"]);
}

#[test]
fn store_create_failure_leaves_memory_untouched() {
    let (base, _rx) = serve(vec![
        Reply::json(200, "[]"),
        Reply::json(500, "boom"),
    ]);
    let mut store = ZoneStore::new(client(&base), InMemoryZoneCache::new());
    store.load_zones();
    let zone: zone_console::Zone = serde_json::from_str(
        r#"{"id": "9", "name": "Lobby", "coordinates": [{"x": 1, "y": 2}, {"x": 3, "y": 4}, {"x": 5, "y": 6}]}"#,
    )
    .unwrap();
    let err = store.create_zone(zone).unwrap_err();
    assert!(matches!(err, ZoneError::RemoteSaveFailed(_)));
    assert!(store.zones().is_empty());
}

// ---- Video ----

#[test]
fn uploads_video_as_multipart() {
    let (base, rx) = serve(vec![Reply::json(200, r#"{"video_id": 42, "status": "uploaded"}"#)]);
    let mut file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
    file.write_all(b"\x00\x00\x00\x18ftypmp42").unwrap();

    let uploaded = client(&base).upload_video(file.path()).expect("upload");
    assert_eq!(uploaded.video_id, "42");

    let request = rx.recv().unwrap();
    assert_eq!(request.method, "POST");
    assert_eq!(request.raw_path, "/api/video/upload");
    assert!(request.headers["content-type"].starts_with("multipart/form-data; boundary="));
    let body = String::from_utf8_lossy(&request.body);
    assert!(body.contains("name=\"file\""));
    assert!(body.contains("Content-Type: video/mp4"));
    assert!(body.contains("ftypmp42"));
}

#[test]
fn reads_video_metadata() {
    let (base, rx) = serve(vec![Reply::json(
        200,
        r#"{"frame_count": 900, "fps": 30.0, "width": 1920, "height": 1080}"#,
    )]);
    let meta = client(&base).video_metadata("abc").expect("metadata");
    assert_eq!(meta.duration_label(), "0:30");
    assert_eq!(meta.resolution_label(), "1920 × 1080");
    assert_eq!(meta.fps_label(), "30 fps");
    assert_eq!(rx.recv().unwrap().raw_path, "/api/video/abc");
}

#[test]
fn first_frame_decodes_as_baseline() {
    let mut png = Vec::new();
    image::RgbaImage::from_pixel(64, 48, image::Rgba([10, 20, 30, 255]))
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    let (base, rx) = serve(vec![Reply {
        status: 200,
        content_type: "image/png",
        body: png,
    }]);
    let api = client(&base);
    let source = ImageSource::Url(api.first_frame_url("v1").unwrap().to_string());
    let image = source.load(api.agent()).expect("baseline");
    assert_eq!((image.width(), image.height()), (64, 48));
    assert_eq!(rx.recv().unwrap().raw_path, "/api/video/v1/first-frame");
}

#[test]
fn undecodable_frame_is_reported() {
    let (base, _rx) = serve(vec![Reply {
        status: 200,
        content_type: "image/jpeg",
        body: b"definitely not a jpeg".to_vec(),
    }]);
    let api = client(&base);
    let source = ImageSource::Url(api.first_frame_url("v1").unwrap().to_string());
    let err = source.load(api.agent()).unwrap_err();
    assert!(matches!(err, ZoneError::ImageDecodeFailed(_)));
}

// ---- Beam ----

#[test]
fn beam_requests_use_backend_contract() {
    let (base, rx) = serve(vec![
        Reply::json(200, r#"{"status":"monitoring"}"#),
        Reply::json(200, r#"{"status":"ok"}"#),
        Reply::json(200, r#"{"is_active": true, "beam_position": [1, 2]}"#),
        Reply::json(200, "{}"),
    ]);
    let api = client(&base);
    api.start_monitoring("v1").expect("start");
    api.beam_control(BeamAction::EmergencyStop).expect("control");
    assert!(api.beam_status().expect("status").is_active);
    api.stop_stream().expect("stream stop");

    let start = rx.recv().unwrap();
    assert_eq!(start.method, "POST");
    assert_eq!(start.raw_path, "/api/beam/start-monitoring?video_id=v1");

    let control = rx.recv().unwrap();
    assert_eq!(control.raw_path, "/api/beam/control");
    let body: serde_json::Value = serde_json::from_slice(&control.body).unwrap();
    assert_eq!(body["action"], "emergency_stop");

    assert_eq!(rx.recv().unwrap().raw_path, "/api/beam/status");
    let stop = rx.recv().unwrap();
    assert_eq!(stop.method, "POST");
    assert_eq!(stop.raw_path, "/api/video/stream/stop");
}
