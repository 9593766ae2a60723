use std::fmt;
use std::sync::Arc;

/// Invoked by the background worker with the response text once a call
/// completes. Data-only handoff: the client state is already committed
/// by the time it runs, and no lock is held.
pub type ResponseCallback = Arc<dyn Fn(String) + Send + Sync>;

/// A single completion request. The endpoint and default model come
/// from the client config; the model can be overridden per request.
#[derive(Clone)]
pub struct InferenceRequest {
    pub(crate) prompt: String,
    pub(crate) system: Option<String>,
    pub(crate) model: Option<String>,
    pub(crate) frame: Option<Vec<u8>>,
    pub(crate) callback: Option<ResponseCallback>,
}

impl InferenceRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            model: None,
            frame: None,
            callback: None,
        }
    }

    /// Instruction text sent alongside the prompt.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Query a different model than the client default.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Attach one already-encoded image (JPEG or PNG bytes). It is
    /// base64-encoded for transport.
    pub fn with_frame(mut self, frame: Vec<u8>) -> Self {
        self.frame = Some(frame);
        self
    }

    /// Called with the response text when the call succeeds.
    pub fn with_callback(mut self, callback: ResponseCallback) -> Self {
        self.callback = Some(callback);
        self
    }
}

impl fmt::Debug for InferenceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceRequest")
            .field("prompt", &self.prompt)
            .field("system", &self.system)
            .field("model", &self.model)
            .field("frame_bytes", &self.frame.as_ref().map(Vec::len))
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}
