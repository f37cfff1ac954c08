//! Shared fixtures for integration tests.
//!
//! External collaborators (ffmpeg, ffprobe, the Reaper workstation, the
//! isolation service) are replaced by mock shell scripts and a minimal
//! loopback HTTP responder; no test here talks to a real tool or network.

#![allow(dead_code)]

use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use audioforge::config::AppConfig;
use audioforge::poll::PollSettings;

/// A mock ffmpeg that copies whatever follows `-i` to the last argument.
pub const MOCK_FFMPEG_COPY: &str = r#"
in=""
prev=""
for a in "$@"; do
  if [ "$prev" = "-i" ]; then in="$a"; fi
  prev="$a"
done
out="${@: -1}"
cp "$in" "$out"
"#;

/// Like [`MOCK_FFMPEG_COPY`] but fails for inputs whose name contains `bad`.
pub const MOCK_FFMPEG_SELECTIVE: &str = r#"
in=""
prev=""
for a in "$@"; do
  if [ "$prev" = "-i" ]; then in="$a"; fi
  prev="$a"
done
case "$in" in
  *bad*) echo "simulated decoder failure" >&2; exit 1;;
esac
out="${@: -1}"
cp "$in" "$out"
"#;

pub fn write_mock_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/usr/bin/env bash\n{body}\n")).expect("write mock tool");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod mock tool");
    path
}

pub const SESSION_TEMPLATE: &str = r#"<REAPER_PROJECT 0.1 "7.0"
  RENDER_FILE "$AUDIOFORGE_RENDER_TARGET$"
  <TRACK {11111111-1111-1111-1111-111111111111}
    NAME "Voces"
    VOLPAN 1 0 -1 -1 1
  >
>
"#;

/// A config wired entirely to mocks under `root`.
pub fn mock_config(root: &Path) -> AppConfig {
    mock_config_with_ffmpeg(root, MOCK_FFMPEG_COPY)
}

pub fn mock_config_with_ffmpeg(root: &Path, ffmpeg_body: &str) -> AppConfig {
    let tools = root.join("tools");
    fs::create_dir_all(&tools).expect("tools dir");
    write_mock_tool(&tools, "ffmpeg", ffmpeg_body);
    write_mock_tool(&tools, "ffprobe", "echo '5.0'");
    let reaper = write_mock_tool(&tools, "reaper", "exit 0");

    let template = root.join("template.rpp");
    fs::write(&template, SESSION_TEMPLATE).expect("write template");
    let automation = root.join("render_master.lua");
    fs::write(&automation, "-- mock automation\n").expect("write automation");

    AppConfig {
        reaper_exe: reaper,
        template_path: template,
        sessions_dir: root.join("sessions"),
        work_dir: root.join("work"),
        automation_script: automation,
        ffmpeg_program: tools.join("ffmpeg").display().to_string(),
        ffprobe_program: tools.join("ffprobe").display().to_string(),
        ..AppConfig::default()
    }
}

pub fn tight_poll() -> PollSettings {
    PollSettings {
        check_interval: Duration::from_millis(25),
        timeout: Duration::from_secs(10),
        settle: Duration::from_millis(10),
        progress_every: Duration::from_secs(5),
    }
}

/// Simulate the detached workstation: watch `sessions_dir` for materialized
/// sessions and render each one to its own `RENDER_FILE` destination, the
/// way a real render honoring the session's settings would.
pub fn spawn_render_watcher(sessions_dir: PathBuf) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            for rpp in session_files(&sessions_dir) {
                if let Some(target) = render_target_of(&rpp) {
                    let artifact = PathBuf::from(format!("{target}.wav"));
                    if !artifact.exists() {
                        let _ = fs::write(&artifact, b"rendered pcm");
                    }
                }
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    })
}

fn session_files(sessions_dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    if let Ok(dirs) = fs::read_dir(sessions_dir) {
        for dir in dirs.flatten() {
            if let Ok(entries) = fs::read_dir(dir.path()) {
                for entry in entries.flatten() {
                    if entry.path().extension().is_some_and(|e| e == "rpp") {
                        found.push(entry.path());
                    }
                }
            }
        }
    }
    found
}

/// The quoted `RENDER_FILE` value of a session, if present.
fn render_target_of(rpp: &Path) -> Option<String> {
    let text = fs::read_to_string(rpp).ok()?;
    let line = text
        .lines()
        .find(|l| l.trim_start().starts_with("RENDER_FILE"))?;
    let start = line.find('"')? + 1;
    let end = line.rfind('"')?;
    (end > start).then(|| line[start..end].to_owned())
}

/// How the loopback isolation server answers each request.
#[derive(Clone, Copy)]
pub enum MockResponse {
    /// Read the full request and answer with this status and body.
    Status(u16, &'static [u8]),
    /// Accept and immediately drop the connection.
    DropConnection,
}

/// Spawn a loopback HTTP responder that serves up to `limit` requests,
/// counting them. Returns the bound port and the request counter.
pub fn spawn_isolation_server(
    response: MockResponse,
    limit: usize,
) -> (u16, Arc<AtomicUsize>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let counter = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&counter);

    let handle = std::thread::spawn(move || {
        for _ in 0..limit {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            seen.fetch_add(1, Ordering::SeqCst);
            match response {
                MockResponse::DropConnection => drop(stream),
                MockResponse::Status(status, body) => {
                    read_full_request(&mut stream);
                    let reason = match status {
                        200 => "OK",
                        401 => "Unauthorized",
                        404 => "Not Found",
                        429 => "Too Many Requests",
                        _ => "Error",
                    };
                    let _ = write!(
                        stream,
                        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = stream.write_all(body);
                }
            }
        }
    });

    (port, counter, handle)
}

/// Drain request headers plus a Content-Length body so the client never sees
/// a broken pipe before the response.
fn read_full_request(stream: &mut std::net::TcpStream) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end;
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => return,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = find_header_end(&buf) {
                    header_end = pos;
                    break;
                }
            }
            Err(_) => return,
        }
    }

    let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
    let content_length: usize = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0);

    let mut remaining = content_length.saturating_sub(buf.len() - header_end - 4);
    while remaining > 0 {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return,
            Ok(n) => remaining = remaining.saturating_sub(n),
        }
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
