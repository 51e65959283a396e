use crate::types::{DisplayEvent, Readout, RenderOptions};
use crossbeam_channel::Receiver;
use log::{error, info, warn};
use serde_json::json;
use sha1_smol::Sha1;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Combined HTTP + WebSocket server feeding a browser notation renderer.
///
/// - `GET /` or `GET /index.html` → serves the notation page
/// - WebSocket upgrade → pushes transcripts (every update) and pitch
///   readouts (throttled) as JSON
///
/// A client that connects mid-stream gets the latest transcript straight
/// after the handshake.
pub struct WsServer {
    event_rx: Receiver<DisplayEvent>,
    addr: String,
    target_fps: u32,
    page_path: PathBuf,
}

struct WsClient {
    stream: TcpStream,
    alive: bool,
}

impl WsClient {
    fn new(stream: TcpStream) -> Self {
        let _ = stream.set_nonblocking(true);
        let _ = stream.set_nodelay(true);
        Self {
            stream,
            alive: true,
        }
    }

    fn send_text(&mut self, text: &str) -> bool {
        match self.stream.write_all(&text_frame(text)) {
            Ok(()) => true,
            Err(_) => {
                self.alive = false;
                false
            }
        }
    }
}

type ClientList = Arc<Mutex<Vec<WsClient>>>;

/// Unmasked server → client text frame.
fn text_frame(text: &str) -> Vec<u8> {
    let payload = text.as_bytes();
    let len = payload.len();
    let mut frame = Vec::with_capacity(10 + len);
    frame.push(0x81); // FIN + text opcode
    if len < 126 {
        frame.push(len as u8);
    } else if len < 65536 {
        frame.push(126);
        frame.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        frame.push(127);
        frame.extend_from_slice(&(len as u64).to_be_bytes());
    }
    frame.extend_from_slice(payload);
    frame
}

/// JSON message for a transcript update. `staffwidth` is the browser
/// renderer's name for the line width.
pub fn transcript_payload(text: &str, options: &RenderOptions) -> String {
    json!({
        "type": "transcript",
        "abc": text,
        "scale": options.scale,
        "staffwidth": options.line_width,
    })
    .to_string()
}

pub fn readout_payload(readout: &Readout) -> String {
    json!({
        "type": "readout",
        "t": readout.timestamp_us,
        "hz": readout.frequency_hz,
        "note": readout.note_name,
    })
    .to_string()
}

/// Parsed HTTP request, enough to decide WS vs HTTP.
struct HttpRequest {
    path: String,
    is_upgrade: bool,
    ws_key: Option<String>,
}

fn parse_request(stream: &mut TcpStream) -> Result<HttpRequest, String> {
    let mut reader = BufReader::new(stream.try_clone().map_err(|e| e.to_string())?);
    let mut path = String::from("/");
    let mut is_upgrade = false;
    let mut ws_key = None;
    let mut first = true;

    loop {
        let mut line = String::new();
        reader.read_line(&mut line).map_err(|e| e.to_string())?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            break;
        }
        if first {
            // "GET /path HTTP/1.1"
            if let Some(p) = trimmed.split_whitespace().nth(1) {
                path = p.to_string();
            }
            first = false;
        }
        let lower = trimmed.to_lowercase();
        if lower.starts_with("upgrade:") && lower.contains("websocket") {
            is_upgrade = true;
        }
        if lower.starts_with("sec-websocket-key:") {
            ws_key = Some(trimmed[18..].trim().to_string());
        }
    }
    Ok(HttpRequest {
        path,
        is_upgrade,
        ws_key,
    })
}

/// `Sec-WebSocket-Accept` value for a client key (RFC 6455 §4.2.2).
pub fn accept_key(key: &str) -> String {
    const MAGIC: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(MAGIC.as_bytes());
    base64_encode(&hasher.digest().bytes())
}

fn ws_handshake(stream: &mut TcpStream, key: &str) -> Result<(), String> {
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         \r\n",
        accept_key(key)
    );
    stream
        .write_all(response.as_bytes())
        .map_err(|e| e.to_string())
}

fn serve_static(stream: &mut TcpStream, content: &[u8], content_type: &str) {
    let header = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: {}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         Cache-Control: no-cache\r\n\
         \r\n",
        content_type,
        content.len()
    );
    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(content);
}

fn content_type_for(path: &str) -> &'static str {
    match path.rsplit('.').next() {
        Some("html") => "text/html; charset=utf-8",
        Some("js") => "application/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

fn serve_404(stream: &mut TcpStream) {
    let body = b"<h1>404</h1><p>Open <a href=\"/\">/</a> for the live transcript</p>";
    let header = format!(
        "HTTP/1.1 404 Not Found\r\n\
         Content-Type: text/html\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n",
        body.len()
    );
    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(body);
}

fn base64_encode(data: &[u8]) -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut result = String::with_capacity(data.len().div_ceil(3) * 4);
    for chunk in data.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = chunk.get(1).copied().unwrap_or(0) as u32;
        let b2 = chunk.get(2).copied().unwrap_or(0) as u32;
        let triple = (b0 << 16) | (b1 << 8) | b2;
        result.push(CHARS[((triple >> 18) & 0x3F) as usize] as char);
        result.push(CHARS[((triple >> 12) & 0x3F) as usize] as char);
        if chunk.len() > 1 {
            result.push(CHARS[((triple >> 6) & 0x3F) as usize] as char);
        } else {
            result.push('=');
        }
        if chunk.len() > 2 {
            result.push(CHARS[(triple & 0x3F) as usize] as char);
        } else {
            result.push('=');
        }
    }
    result
}

/// Catch a new client up and add it to the broadcast list under one lock,
/// so a transcript broadcast cannot slip in between.
fn register_client(clients: &ClientList, latest: &Mutex<Option<String>>, mut client: WsClient) {
    let Ok(mut cl) = clients.lock() else { return };
    if let Some(msg) = latest.lock().ok().and_then(|l| l.clone()) {
        client.send_text(&msg);
    }
    if client.alive {
        cl.push(client);
    }
}

fn handle_connection(
    mut stream: TcpStream,
    clients: ClientList,
    latest: Arc<Mutex<Option<String>>>,
    page: Arc<Vec<u8>>,
    static_dir: Arc<PathBuf>,
) {
    match parse_request(&mut stream) {
        Ok(req) if req.is_upgrade => {
            let Some(key) = req.ws_key else {
                warn!("WS upgrade without key");
                return;
            };
            if let Err(e) = ws_handshake(&mut stream, &key) {
                warn!("WS handshake failed: {}", e);
                return;
            }
            info!("WebSocket client connected");
            register_client(&clients, &latest, WsClient::new(stream));
        }
        Ok(req) => match req.path.as_str() {
            "/" | "/index.html" => {
                if page.is_empty() {
                    serve_404(&mut stream);
                } else {
                    serve_static(&mut stream, &page, "text/html; charset=utf-8");
                }
            }
            path => {
                // Sibling files of the page; reject path traversal
                let clean = path.trim_start_matches('/');
                if clean.contains("..") || clean.contains('\\') {
                    serve_404(&mut stream);
                    return;
                }
                match fs::read(static_dir.join(clean)) {
                    Ok(data) => serve_static(&mut stream, &data, content_type_for(clean)),
                    Err(_) => serve_404(&mut stream),
                }
            }
        },
        Err(e) => warn!("Request parse error: {}", e),
    }
}

impl WsServer {
    pub fn new(event_rx: Receiver<DisplayEvent>, addr: String, target_fps: u32, page_path: PathBuf) -> Self {
        Self {
            event_rx,
            addr,
            target_fps: target_fps.max(1),
            page_path,
        }
    }

    pub fn run(self) {
        let clients: ClientList = Arc::new(Mutex::new(Vec::new()));
        let latest: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let page = match fs::read(&self.page_path) {
            Ok(data) => {
                info!("Loaded notation page: {} ({} bytes)", self.page_path.display(), data.len());
                Arc::new(data)
            }
            Err(e) => {
                warn!("Could not load {}: {}; HTTP serving disabled", self.page_path.display(), e);
                Arc::new(Vec::new())
            }
        };
        let static_dir = Arc::new(
            self.page_path
                .parent()
                .unwrap_or(std::path::Path::new("."))
                .to_path_buf(),
        );

        let accept_clients = clients.clone();
        let accept_latest = latest.clone();
        let addr = self.addr.clone();
        let spawned = thread::Builder::new().name("ws-accept".into()).spawn(move || {
            let listener = match TcpListener::bind(&addr) {
                Ok(l) => l,
                Err(e) => {
                    error!("Server failed to bind {}: {}", addr, e);
                    return;
                }
            };
            info!("Server listening on http://{}", addr);

            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        let (cl, lt, pg, sd) = (accept_clients.clone(), accept_latest.clone(), page.clone(), static_dir.clone());
                        // HTTP connections close immediately; WS connections
                        // are moved to the client list.
                        thread::spawn(move || handle_connection(stream, cl, lt, pg, sd));
                    }
                    Err(e) => warn!("TCP accept error: {}", e),
                }
            }
        });
        if let Err(e) = spawned {
            error!("Could not start acceptor thread: {}", e);
            return;
        }

        let readout_interval = Duration::from_micros(1_000_000 / self.target_fps as u64);
        let mut last_readout: Option<Instant> = None;

        for event in self.event_rx.iter() {
            let msg = match event {
                DisplayEvent::Transcript { text, options } => {
                    let msg = transcript_payload(&text, &options);
                    if let Ok(mut l) = latest.lock() {
                        *l = Some(msg.clone());
                    }
                    msg
                }
                DisplayEvent::Readout(r) => {
                    if last_readout.is_some_and(|t| t.elapsed() < readout_interval) {
                        continue;
                    }
                    last_readout = Some(Instant::now());
                    readout_payload(&r)
                }
            };

            let Ok(mut cl) = clients.lock() else { break };
            for client in cl.iter_mut() {
                client.send_text(&msg);
            }
            cl.retain(|c| c.alive);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_key_rfc_example() {
        assert_eq!(accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn test_base64_padding() {
        assert_eq!(base64_encode(b"f"), "Zg==");
        assert_eq!(base64_encode(b"fo"), "Zm8=");
        assert_eq!(base64_encode(b"foo"), "Zm9v");
        assert_eq!(base64_encode(b""), "");
    }

    #[test]
    fn test_text_frame_length_encoding() {
        assert_eq!(&text_frame("hi")[..2], &[0x81, 2]);
        let mid = text_frame(&"x".repeat(300));
        assert_eq!(&mid[..4], &[0x81, 126, 0x01, 0x2C]);
        let big = text_frame(&"x".repeat(70_000));
        assert_eq!(big[1], 127);
        assert_eq!(&big[2..10], &70_000u64.to_be_bytes());
    }

    #[test]
    fn test_transcript_payload_shape() {
        let opts = RenderOptions { scale: 1.5, line_width: 600 };
        let v: serde_json::Value = serde_json::from_str(&transcript_payload("X:1\nA ", &opts)).unwrap();
        assert_eq!(v["type"], "transcript");
        assert_eq!(v["abc"], "X:1\nA ");
        assert_eq!(v["scale"], 1.5);
        assert_eq!(v["staffwidth"], 600);
    }

    #[test]
    fn test_readout_payload_silence() {
        let r = Readout {
            timestamp_us: 9,
            frequency_hz: None,
            note_name: None,
        };
        let v: serde_json::Value = serde_json::from_str(&readout_payload(&r)).unwrap();
        assert_eq!(v["type"], "readout");
        assert!(v["hz"].is_null());
        assert!(v["note"].is_null());
    }

    #[test]
    fn test_new_client_gets_latest_and_joins_broadcast() {
        use std::io::Read;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut browser = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server_side, _) = listener.accept().unwrap();

        let clients: ClientList = Arc::new(Mutex::new(Vec::new()));
        let latest = Mutex::new(Some("X:1".to_string()));
        register_client(&clients, &latest, WsClient::new(server_side));
        assert_eq!(clients.lock().unwrap().len(), 1);

        let expected = text_frame("X:1");
        let mut got = vec![0u8; expected.len()];
        browser.read_exact(&mut got).unwrap();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("abcjs-basic-min.js"), "application/javascript; charset=utf-8");
        assert_eq!(content_type_for("style.css"), "text/css; charset=utf-8");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
