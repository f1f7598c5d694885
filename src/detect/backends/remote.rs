use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use url::Url;

use crate::detect::backend::{ActivityClassifier, ClassifyError};
use crate::detect::result::{ActivityLabel, ActivityResult};
use crate::frame::{Frame, DEFAULT_JPEG_QUALITY};

/// Connection settings for a remote inference endpoint.
#[derive(Clone, Debug)]
pub struct RemoteConfig {
    /// Endpoint receiving `POST` with a JPEG body, e.g. `http://10.0.0.5:8081/process_frame`.
    pub url: String,
    /// Bound on the whole request, connect included.
    pub timeout: Duration,
    pub jpeg_quality: u8,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8081/process_frame".to_string(),
            timeout: Duration::from_secs(2),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Body returned by the inference service.
#[derive(Debug, Deserialize)]
struct ServiceResponse {
    activity: String,
    activity_probability: f64,
    all_probabilities: HashMap<String, f64>,
}

/// Classifier that delegates to a trained model behind an HTTP endpoint.
///
/// The frame is encoded as JPEG and posted as the raw request body. The call is
/// synchronous and bounded by the configured timeout.
pub struct RemoteClassifier {
    config: RemoteConfig,
    agent: ureq::Agent,
}

impl RemoteClassifier {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        validate_endpoint(&config.url)?;
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.timeout)
            .timeout(config.timeout)
            .build();
        Ok(Self { config, agent })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }
}

impl ActivityClassifier for RemoteClassifier {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn classify(&mut self, frame: &Frame) -> Result<ActivityResult, ClassifyError> {
        let body = frame
            .encode_jpeg(self.config.jpeg_quality)
            .map_err(|e| ClassifyError::Encode(e.to_string()))?;

        let response = match self
            .agent
            .post(&self.config.url)
            .set("Content-Type", "image/jpeg")
            .send_bytes(&body)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => return Err(ClassifyError::Status(code)),
            Err(ureq::Error::Transport(transport)) => {
                return Err(ClassifyError::Transport(transport.to_string()))
            }
        };

        let status = response.status();
        if !(200..300).contains(&status) {
            return Err(ClassifyError::Status(status));
        }

        let text = response
            .into_string()
            .map_err(|e| ClassifyError::Transport(format!("read response body: {}", e)))?;
        parse_response(&text)
    }
}

/// Accept only absolute http(s) URLs with a host.
pub fn validate_endpoint(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("parse classifier url '{}'", raw))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(anyhow!(
                "unsupported classifier scheme '{}'; expected http or https",
                other
            ))
        }
    }
    if url.host_str().is_none() {
        return Err(anyhow!("classifier url '{}' has no host", raw));
    }
    Ok(url)
}

/// Parse a service body into an [`ActivityResult`].
///
/// Missing fields, non-JSON bodies and probabilities outside `[0, 1]` are
/// malformed. An activity name with no known mapping becomes `Unknown`; score
/// entries with unknown names are ignored.
pub fn parse_response(body: &str) -> Result<ActivityResult, ClassifyError> {
    let parsed: ServiceResponse =
        serde_json::from_str(body).map_err(|e| ClassifyError::Malformed(e.to_string()))?;

    check_probability("activity_probability", parsed.activity_probability)?;

    let mut scores = BTreeMap::new();
    for (name, value) in &parsed.all_probabilities {
        check_probability(name, *value)?;
        match ActivityLabel::from_service_name(name) {
            Some(label) => {
                scores.insert(label, *value as f32);
            }
            None => log::debug!("ignoring score for unrecognised activity '{}'", name),
        }
    }

    let label = ActivityLabel::from_service_name(&parsed.activity).unwrap_or_else(|| {
        log::debug!("unrecognised activity '{}' from service", parsed.activity);
        ActivityLabel::Unknown
    });

    Ok(ActivityResult::new(
        label,
        parsed.activity_probability as f32,
        scores,
    ))
}

fn check_probability(field: &str, value: f64) -> Result<(), ClassifyError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ClassifyError::Malformed(format!(
            "{} = {} is not a probability",
            field, value
        )))
    }
}
