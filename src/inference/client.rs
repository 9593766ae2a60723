use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use ollama_rs::Ollama;
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::generation::images::Image;
use tracing::{debug, info, warn};

use crate::clock::{Clock, MonotonicClock};
use crate::config::InferenceConfig;
use crate::runtime;

use super::{InferenceError, InferenceRequest};

/// Completion state shared between the submitting thread and the
/// background worker. Always read and written as a group under the one
/// lock, never field by field.
#[derive(Debug, Default)]
struct ClientState {
    in_flight: bool,
    last_submit_at: Option<Instant>,
    last_response: Option<String>,
    last_response_at: Option<Instant>,
    last_error: Option<InferenceError>,
}

/// Throttled, single-flight wrapper around a slow completion backend.
///
/// Every method returns immediately; the call itself runs on the shared
/// background runtime. At most one request is in flight per client, and
/// a submission while one is in flight is dropped, not queued, so a
/// backend slower than the submission cadence never builds a backlog.
pub struct InferenceClient {
    backend: Arc<Ollama>,
    model: String,
    state: Arc<Mutex<ClientState>>,
    clock: Arc<dyn Clock>,
}

impl InferenceClient {
    pub fn new(config: InferenceConfig) -> Result<Self, InferenceError> {
        Self::with_clock(config, Arc::new(MonotonicClock))
    }

    pub fn with_clock(
        config: InferenceConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, InferenceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| InferenceError::Endpoint(e.to_string()))?;
        let port = config.url.port().unwrap_or(11434);
        let backend = Ollama::new_with_client(config.url, port, http);
        Ok(Self {
            backend: Arc::new(backend),
            model: config.model,
            state: Arc::new(Mutex::new(ClientState::default())),
            clock,
        })
    }

    /// Whether a submission would be dispatched right now: nothing in
    /// flight and at least `interval` since the last submission. A
    /// client that has never submitted is ready immediately.
    ///
    /// Pure query; the throttle clock only advances in
    /// [`submit`](InferenceClient::submit).
    pub fn should_submit(&self, interval: Duration) -> bool {
        let state = self.lock_state();
        if state.in_flight {
            return false;
        }
        match state.last_submit_at {
            None => true,
            Some(at) => self.clock.now().duration_since(at) >= interval,
        }
    }

    /// Dispatch a request on the background runtime, unless one is
    /// already in flight. Returns whether the request was dispatched; a
    /// drop is expected steady-state behaviour, not an error.
    pub fn submit(&self, request: InferenceRequest) -> bool {
        {
            let mut state = self.lock_state();
            if state.in_flight {
                debug!("submission dropped, request already in flight");
                return false;
            }
            state.in_flight = true;
            state.last_submit_at = Some(self.clock.now());
        }

        let backend = Arc::clone(&self.backend);
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let state = Arc::clone(&self.state);
        let clock = Arc::clone(&self.clock);
        runtime::spawn(async move {
            let mut generation = GenerationRequest::new(model, request.prompt.clone());
            if let Some(system) = &request.system {
                generation = generation.system(system.clone());
            }
            if let Some(frame) = &request.frame {
                let encoded = BASE64.encode(frame);
                generation = generation.add_image(Image::from_base64(&encoded));
            }

            match backend.generate(generation).await {
                Ok(completion) => {
                    let text = completion.response.trim().to_string();
                    info!("inference response: {text}");
                    {
                        let mut state = state.lock().expect("client state poisoned");
                        state.last_response = Some(text.clone());
                        state.last_response_at = Some(clock.now());
                        state.last_error = None;
                        state.in_flight = false;
                    }
                    if let Some(callback) = &request.callback {
                        callback(text);
                    }
                }
                Err(e) => {
                    // keep the previous good answer; stale beats empty
                    warn!("inference call failed: {e}");
                    let mut state = state.lock().expect("client state poisoned");
                    state.last_error = Some(InferenceError::Backend(e.to_string()));
                    state.in_flight = false;
                }
            }
        });
        true
    }

    /// Most recent completed response, if any. Safe to call every frame
    /// regardless of in-flight status.
    pub fn last_response(&self) -> Option<String> {
        self.lock_state().last_response.clone()
    }

    /// When the most recent response completed.
    pub fn last_response_at(&self) -> Option<Instant> {
        self.lock_state().last_response_at
    }

    /// Most recent backend failure. Cleared by the next success.
    pub fn last_error(&self) -> Option<InferenceError> {
        self.lock_state().last_error.clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.lock_state().in_flight
    }

    fn lock_state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().expect("client state poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use url::Url;

    fn config(url: &str) -> InferenceConfig {
        InferenceConfig {
            url: Url::parse(url).unwrap(),
            model: "test-model".into(),
            interval_secs: 3.0,
            timeout_secs: 5,
        }
    }

    fn unroutable_client() -> (InferenceClient, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        // port 1 refuses the connection, so the worker finishes fast
        let client = InferenceClient::with_clock(config("http://127.0.0.1:1"), clock.clone())
            .expect("client builds without touching the network");
        (client, clock)
    }

    fn wait_until_idle(client: &InferenceClient) {
        for _ in 0..250 {
            if !client.is_in_flight() {
                return;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        panic!("worker never finished");
    }

    #[test]
    fn test_cold_start_is_not_throttled() {
        let (client, _clock) = unroutable_client();
        assert!(client.should_submit(Duration::from_secs(3)));
    }

    #[test]
    fn test_throttle_spacing() {
        let (client, clock) = unroutable_client();

        assert!(client.submit(InferenceRequest::new("a cat")));
        wait_until_idle(&client);

        assert!(!client.should_submit(Duration::from_secs(3)));
        clock.advance(Duration::from_secs(2));
        assert!(!client.should_submit(Duration::from_secs(3)));
        clock.advance(Duration::from_secs(1));
        assert!(client.should_submit(Duration::from_secs(3)));
    }

    #[test]
    fn test_should_submit_does_not_advance_the_clock() {
        let (client, clock) = unroutable_client();

        assert!(client.submit(InferenceRequest::new("a cat")));
        wait_until_idle(&client);
        clock.advance(Duration::from_secs(3));

        for _ in 0..10 {
            assert!(client.should_submit(Duration::from_secs(3)));
        }
    }

    #[test]
    fn test_failure_records_error_and_keeps_response_empty() {
        let (client, _clock) = unroutable_client();

        assert!(client.submit(InferenceRequest::new("a cat")));
        wait_until_idle(&client);

        assert!(matches!(
            client.last_error(),
            Some(InferenceError::Backend(_))
        ));
        assert_eq!(client.last_response(), None);
        assert!(!client.is_in_flight());
    }

    #[test]
    fn test_callback_is_skipped_on_failure() {
        let (client, _clock) = unroutable_client();
        let fired = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&fired);

        client.submit(
            InferenceRequest::new("a cat")
                .with_callback(Arc::new(move |_| *flag.lock().unwrap() = true)),
        );
        wait_until_idle(&client);

        assert!(!*fired.lock().unwrap());
    }
}
