//! Remote descriptor service.
//!
//! The service is an opaque request/response collaborator: `POST
//! {prompt, genre}` and receive a descriptor. Every failure is a
//! [`RemoteError`], which the generator turns into the heuristic fallback.

use serde::Serialize;

use super::descriptor::SoundDescriptor;
use crate::config::RemoteConfig;
use crate::error::RemoteError;

/// Request body sent to the service.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DescriptorRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
}

impl DescriptorRequest {
    pub fn new(prompt: &str, genre: Option<&str>) -> Self {
        Self {
            prompt: prompt.to_string(),
            genre: genre.map(str::to_string),
        }
    }
}

/// Anything that can answer a descriptor request.
pub trait DescriptorService: Send + Sync {
    fn fetch(&self, request: &DescriptorRequest) -> Result<SoundDescriptor, RemoteError>;
}

/// Service used when no endpoint is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct OfflineDescriptorService;

impl DescriptorService for OfflineDescriptorService {
    fn fetch(&self, _request: &DescriptorRequest) -> Result<SoundDescriptor, RemoteError> {
        Err(RemoteError::Unavailable)
    }
}

/// Parse a response body. Accepts `{"descriptor": {...}}` as well as a
/// bare descriptor object.
pub fn parse_response(body: &str) -> Result<SoundDescriptor, RemoteError> {
    let mut value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| RemoteError::Decode(e.to_string()))?;
    if let Some(inner) = value.get_mut("descriptor").filter(|v| v.is_object()) {
        value = inner.take();
    }
    if !value.is_object() {
        return Err(RemoteError::Decode("expected a JSON object".to_string()));
    }
    serde_json::from_value(value).map_err(|e| RemoteError::Decode(e.to_string()))
}

/// HTTP client for a descriptor endpoint.
#[cfg(feature = "remote")]
pub struct HttpDescriptorService {
    client: reqwest::blocking::Client,
    endpoint: String,
}

#[cfg(feature = "remote")]
impl HttpDescriptorService {
    pub fn new(endpoint: impl Into<String>, timeout: std::time::Duration) -> Result<Self, RemoteError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(feature = "remote")]
impl DescriptorService for HttpDescriptorService {
    fn fetch(&self, request: &DescriptorRequest) -> Result<SoundDescriptor, RemoteError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        parse_response(&body)
    }
}

/// Build the service described by `config`.
///
/// Falls back to [`OfflineDescriptorService`] when no endpoint is set, the
/// `remote` feature is disabled, or the client cannot be built.
pub fn service_from_config(config: &RemoteConfig) -> Box<dyn DescriptorService> {
    let Some(endpoint) = config.endpoint.as_deref() else {
        return Box::new(OfflineDescriptorService);
    };

    #[cfg(feature = "remote")]
    {
        match HttpDescriptorService::new(endpoint, config.timeout()) {
            Ok(service) => {
                log::info!("[SOUNDBANK] Using remote descriptor service at {}", endpoint);
                Box::new(service)
            }
            Err(e) => {
                log::warn!("[SOUNDBANK] Cannot create HTTP client ({}), working offline", e);
                Box::new(OfflineDescriptorService)
            }
        }
    }

    #[cfg(not(feature = "remote"))]
    {
        log::warn!(
            "[SOUNDBANK] Endpoint {} configured but remote support is disabled",
            endpoint
        );
        Box::new(OfflineDescriptorService)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wrapped_and_bare_responses() {
        let wrapped = parse_response(r#"{"descriptor": {"name": "Kora", "lfo": {"rate": 3}}}"#).unwrap();
        assert_eq!(wrapped.name.as_deref(), Some("Kora"));
        assert_eq!(wrapped.lfo.map(|l| l.rate), Some(3.0));

        let bare = parse_response(r#"{"name": "Balafon", "oscillator": {"type": "triangle"}}"#).unwrap();
        assert_eq!(bare.name.as_deref(), Some("Balafon"));
    }

    #[test]
    fn test_parse_rejects_non_objects() {
        assert!(matches!(parse_response("not json"), Err(RemoteError::Decode(_))));
        assert!(matches!(parse_response("[1, 2]"), Err(RemoteError::Decode(_))));
        assert!(matches!(parse_response(r#"{"descriptor": null}"#), Ok(_)));
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(DescriptorRequest::new("bass", None)).unwrap();
        assert_eq!(body, serde_json::json!({"prompt": "bass"}));
        let body = serde_json::to_value(DescriptorRequest::new("bass", Some("Trap"))).unwrap();
        assert_eq!(body["genre"], "Trap");
    }

    #[test]
    fn test_offline_service_is_unavailable() {
        let request = DescriptorRequest::new("x", None);
        assert!(matches!(
            OfflineDescriptorService.fetch(&request),
            Err(RemoteError::Unavailable)
        ));
        let service = service_from_config(&RemoteConfig::default());
        assert!(matches!(service.fetch(&request), Err(RemoteError::Unavailable)));
    }

    #[cfg(feature = "remote")]
    #[test]
    fn test_unreachable_endpoint_is_a_transport_error() {
        let service = HttpDescriptorService::new(
            "http://127.0.0.1:9/generateSoundBank",
            std::time::Duration::from_millis(200),
        )
        .unwrap();
        let result = service.fetch(&DescriptorRequest::new("bass", None));
        assert!(matches!(result, Err(RemoteError::Transport(_))));
    }
}
