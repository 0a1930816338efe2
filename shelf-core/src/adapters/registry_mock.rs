//! Mock school registry server for testing
//!
//! Serves `GET /students/{admissionNumber}` on a random local port with the
//! same response shape as the real registry. Failure modes (error status,
//! slow answers, broken bodies) are switched on through `MockConfig`.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crate::ports::{EnrollmentStatus, RegistryStudent};

pub struct MockRegistryServer {
    port: u16,
    running: Arc<AtomicBool>,
    requests: Arc<AtomicUsize>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Students the registry knows about
    pub students: Vec<RegistryStudent>,
    /// Status returned instead of a normal answer
    pub fail_status: Option<u16>,
    /// Only the first N requests fail with `fail_status` (0 = all of them)
    pub fail_times: usize,
    /// Answer 200 with a body that is not a student record
    pub malformed_body: bool,
    /// Answer 200 with this exact body
    pub raw_body: Option<String>,
    /// Answer 200 with a record for a different admission number
    pub wrong_admission_number: bool,
    /// Delay in milliseconds before responding
    pub delay_ms: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            students: vec![
                student("S100", "Alice Mwangi", "Grade 7", EnrollmentStatus::Active),
                student("S200", "Brian Otieno", "Grade 8", EnrollmentStatus::Inactive),
            ],
            fail_status: None,
            fail_times: 0,
            malformed_body: false,
            raw_body: None,
            wrong_admission_number: false,
            delay_ms: 0,
        }
    }
}

pub fn student(
    admission_number: &str,
    name: &str,
    grade: &str,
    status: EnrollmentStatus,
) -> RegistryStudent {
    RegistryStudent {
        admission_number: admission_number.to_string(),
        name: name.to_string(),
        grade: grade.to_string(),
        status,
    }
}

impl MockRegistryServer {
    /// Start a new mock server on a random available port
    pub fn start(config: MockConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        let running = Arc::new(AtomicBool::new(true));
        let requests = Arc::new(AtomicUsize::new(0));

        // Non-blocking accept so the loop can notice shutdown
        listener.set_nonblocking(true)?;

        let running_clone = running.clone();
        let requests_clone = requests.clone();
        let thread_handle = thread::spawn(move || {
            while running_clone.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        let cfg = config.clone();
                        let seen = requests_clone.fetch_add(1, Ordering::SeqCst);
                        thread::spawn(move || {
                            handle_connection(stream, &cfg, seen);
                        });
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(std::time::Duration::from_millis(10));
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self {
            port,
            running,
            requests,
            thread_handle: Some(thread_handle),
        })
    }

    /// Base URL to hand to the client (`http://127.0.0.1:{port}/students`)
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}/students", self.port)
    }

    /// Number of connections accepted so far
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MockRegistryServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn handle_connection(mut stream: TcpStream, config: &MockConfig, seen: usize) {
    // Accepted sockets may inherit non-blocking mode on some platforms
    let _ = stream.set_nonblocking(false);
    let mut buffer = [0; 4096];

    let Ok(n) = stream.read(&mut buffer) else {
        return;
    };
    let request = String::from_utf8_lossy(&buffer[..n]);

    if config.delay_ms > 0 {
        thread::sleep(std::time::Duration::from_millis(config.delay_ms));
    }

    let first_line = request.lines().next().unwrap_or("");
    let parts: Vec<&str> = first_line.split_whitespace().collect();
    if parts.len() < 2 || parts[0] != "GET" {
        send_response(&mut stream, 400, "Bad Request", r#"{"error": "Invalid request"}"#);
        return;
    }

    if let Some(status) = config.fail_status {
        if config.fail_times == 0 || seen < config.fail_times {
            send_response(&mut stream, status, "Mock Failure", r#"{"error": "mock failure"}"#);
            return;
        }
    }

    let Some(admission_number) = parts[1].strip_prefix("/students/") else {
        send_response(&mut stream, 404, "Not Found", r#"{"error": "Not found"}"#);
        return;
    };

    if config.malformed_body {
        send_response(&mut stream, 200, "OK", r#"{"unexpected": true}"#);
        return;
    }
    if let Some(body) = &config.raw_body {
        send_response(&mut stream, 200, "OK", body);
        return;
    }

    match config
        .students
        .iter()
        .find(|s| s.admission_number == admission_number)
    {
        Some(found) => {
            let mut record = found.clone();
            if config.wrong_admission_number {
                record.admission_number = format!("{}-OTHER", record.admission_number);
            }
            let body = serde_json::to_string(&record).unwrap_or_default();
            send_response(&mut stream, 200, "OK", &body);
        }
        None => send_response(&mut stream, 404, "Not Found", r#"{"error": "Student not found"}"#),
    }
}

fn send_response(stream: &mut TcpStream, status: u16, status_text: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        status_text,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::school_registry::SchoolRegistryClient;
    use crate::domain::result::Error;
    use crate::ports::{RegistryLookup, StudentRegistry};
    use std::time::Duration;

    fn client(server: &MockRegistryServer, attempts: u32) -> SchoolRegistryClient {
        SchoolRegistryClient::new_with_base_url(&server.base_url(), Duration::from_secs(2), attempts)
            .unwrap()
            .with_backoff(Duration::from_millis(5))
    }

    #[test]
    fn test_known_student_is_found() {
        let server = MockRegistryServer::start(MockConfig::default()).unwrap();
        let lookup = client(&server, 1).verify_student("S100").unwrap();

        match lookup {
            RegistryLookup::Found(record) => {
                assert_eq!(record.admission_number, "S100");
                assert_eq!(record.name, "Alice Mwangi");
                assert_eq!(record.grade, "Grade 7");
                assert_eq!(record.status, EnrollmentStatus::Active);
            }
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_student_is_not_found_without_retry() {
        let server = MockRegistryServer::start(MockConfig::default()).unwrap();
        let lookup = client(&server, 3).verify_student("S999").unwrap();
        assert_eq!(lookup, RegistryLookup::NotFound);
        assert_eq!(server.request_count(), 1);
    }

    #[test]
    fn test_malformed_admission_number_sends_no_request() {
        let server = MockRegistryServer::start(MockConfig::default()).unwrap();
        let client = client(&server, 3);
        assert_eq!(client.verify_student("").unwrap(), RegistryLookup::NotFound);
        assert_eq!(client.verify_student("S1/../x").unwrap(), RegistryLookup::NotFound);
        assert_eq!(server.request_count(), 0);
    }

    #[test]
    fn test_client_errors_map_to_not_found() {
        for status in [400, 410, 422] {
            let server = MockRegistryServer::start(MockConfig {
                fail_status: Some(status),
                ..Default::default()
            })
            .unwrap();
            let lookup = client(&server, 3).verify_student("S100").unwrap();
            assert_eq!(lookup, RegistryLookup::NotFound, "status {}", status);
            assert_eq!(server.request_count(), 1);
        }
    }

    #[test]
    fn test_server_error_is_retried_then_unavailable() {
        let server = MockRegistryServer::start(MockConfig {
            fail_status: Some(503),
            ..Default::default()
        })
        .unwrap();
        let err = client(&server, 3).verify_student("S100").unwrap_err();
        assert!(matches!(err, Error::RegistryUnavailable(_)));
        assert_eq!(server.request_count(), 3);
    }

    #[test]
    fn test_transient_failure_recovers() {
        let server = MockRegistryServer::start(MockConfig {
            fail_status: Some(500),
            fail_times: 1,
            ..Default::default()
        })
        .unwrap();
        let lookup = client(&server, 3).verify_student("S200").unwrap();
        assert!(matches!(lookup, RegistryLookup::Found(_)));
        assert_eq!(server.request_count(), 2);
    }

    #[test]
    fn test_malformed_body_is_unavailable() {
        let server = MockRegistryServer::start(MockConfig {
            malformed_body: true,
            ..Default::default()
        })
        .unwrap();
        let err = client(&server, 1).verify_student("S100").unwrap_err();
        assert!(matches!(err, Error::RegistryUnavailable(_)));
    }

    #[test]
    fn test_unrecognised_status_is_found_without_retry() {
        for body in [
            r#"{"admissionNumber": "S100", "name": "Alice Mwangi", "grade": "Grade 7"}"#,
            r#"{"admissionNumber": "S100", "name": "Alice Mwangi", "status": "graduated"}"#,
        ] {
            let server = MockRegistryServer::start(MockConfig {
                raw_body: Some(body.to_string()),
                ..Default::default()
            })
            .unwrap();
            match client(&server, 3).verify_student("S100").unwrap() {
                RegistryLookup::Found(record) => {
                    assert_eq!(record.name, "Alice Mwangi");
                    assert_eq!(record.status, EnrollmentStatus::Unknown);
                }
                other => panic!("expected Found, got {:?}", other),
            }
            assert_eq!(server.request_count(), 1);
        }
    }

    #[test]
    fn test_mismatched_record_is_not_found() {
        let server = MockRegistryServer::start(MockConfig {
            wrong_admission_number: true,
            ..Default::default()
        })
        .unwrap();
        let lookup = client(&server, 1).verify_student("S100").unwrap();
        assert_eq!(lookup, RegistryLookup::NotFound);
    }

    #[test]
    fn test_timeout_is_unavailable() {
        let server = MockRegistryServer::start(MockConfig {
            delay_ms: 1500,
            ..Default::default()
        })
        .unwrap();
        let client =
            SchoolRegistryClient::new_with_base_url(&server.base_url(), Duration::from_millis(300), 1)
                .unwrap();
        let err = client.verify_student("S100").unwrap_err();
        assert!(matches!(err, Error::RegistryUnavailable(_)));
    }

    #[test]
    fn test_unreachable_registry_is_unavailable() {
        let mut server = MockRegistryServer::start(MockConfig::default()).unwrap();
        let base_url = server.base_url();
        server.stop();
        drop(server);

        let client = SchoolRegistryClient::new_with_base_url(&base_url, Duration::from_secs(1), 2)
            .unwrap()
            .with_backoff(Duration::from_millis(5));
        let err = client.verify_student("S100").unwrap_err();
        assert!(matches!(err, Error::RegistryUnavailable(_)));
    }
}
