//! School student registry client
//!
//! Verifies admission numbers against the school's student directory:
//! `GET <base>/<admissionNumber>` answering
//! `{ "admissionNumber", "name", "grade", "status" }`.

use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use url::Url;

use crate::config::RegistrySettings;
use crate::domain::result::{Error, Result};
use crate::ports::{RegistryLookup, RegistryStudent, StudentRegistry};

/// First retry delay; doubles on every further attempt
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Admission numbers that cannot name a registry resource. These are
/// answered with `NotFound` without touching the network.
pub fn is_well_formed(admission_number: &str) -> bool {
    !admission_number.is_empty()
        && !admission_number
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#'))
}

/// HTTP client for the school registry
#[derive(Debug)]
pub struct SchoolRegistryClient {
    client: Client,
    base_url: Url,
    timeout: Duration,
    max_attempts: u32,
    initial_backoff: Duration,
}

impl SchoolRegistryClient {
    pub fn new(settings: &RegistrySettings) -> Result<Self> {
        Self::new_with_base_url(&settings.base_url, settings.timeout(), settings.max_attempts)
    }

    pub fn new_with_base_url(base_url: &str, timeout: Duration, max_attempts: u32) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid registry URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "registry URL '{}' cannot take a path",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            timeout,
            max_attempts: max_attempts.max(1),
            initial_backoff: INITIAL_BACKOFF,
        })
    }

    /// Override the first retry delay
    pub fn with_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    fn student_url(&self, admission_number: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("registry URL '{}' cannot take a path", self.base_url)))?
            .pop_if_empty()
            .push(admission_number);
        Ok(url)
    }

    /// One request, no retry
    fn lookup_once(&self, admission_number: &str) -> Result<RegistryLookup> {
        let url = self.student_url(admission_number)?;

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .map_err(|e| self.map_request_error(e))?;

        match response.status() {
            StatusCode::NOT_FOUND
            | StatusCode::BAD_REQUEST
            | StatusCode::GONE
            | StatusCode::UNPROCESSABLE_ENTITY => return Ok(RegistryLookup::NotFound),
            status if !status.is_success() => {
                return Err(Error::RegistryUnavailable(format!(
                    "registry answered HTTP {}",
                    status.as_u16()
                )))
            }
            _ => {}
        }

        let record: RegistryStudent = response.json().map_err(|e| {
            Error::RegistryUnavailable(format!(
                "registry response could not be read: {}",
                e.without_url()
            ))
        })?;

        // A record for someone else is no answer for this admission number
        if record.admission_number.trim() != admission_number {
            return Ok(RegistryLookup::NotFound);
        }

        Ok(RegistryLookup::Found(record))
    }

    /// Request URLs carry admission numbers, so they are kept out of messages
    fn map_request_error(&self, error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::RegistryUnavailable(format!(
                "no answer within {} seconds",
                self.timeout.as_secs_f32()
            ))
        } else if error.is_connect() {
            Error::RegistryUnavailable("unable to connect to the student registry".to_string())
        } else {
            Error::RegistryUnavailable(format!("request failed: {}", error.without_url()))
        }
    }
}

impl StudentRegistry for SchoolRegistryClient {
    fn name(&self) -> &str {
        "school-registry"
    }

    /// Bounded retry with exponential backoff, on `RegistryUnavailable` only
    fn verify_student(&self, admission_number: &str) -> Result<RegistryLookup> {
        let admission_number = admission_number.trim();
        if !is_well_formed(admission_number) {
            return Ok(RegistryLookup::NotFound);
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.lookup_once(admission_number) {
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.initial_backoff * 2u32.pow(attempt - 1);
                    eprintln!(
                        "[shelf] Student registry unavailable, retrying in {}ms (attempt {}/{}): {}",
                        delay.as_millis(),
                        attempt,
                        self.max_attempts,
                        e
                    );
                    thread::sleep(delay);
                }
                outcome => return outcome,
            }
        }
    }
}
