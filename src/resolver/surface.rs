// Request/response surface - JSON shapes for callers

use serde::{Deserialize, Serialize};

use super::cookies;
use super::credentials::{CredentialSource, REQUIRED_MARKERS};
use super::diagnostics::FailureKind;
use super::errors::ResolveError;
use super::models::{
    AttemptRecord, FormatSelector, Operation, Payload, Provenance, Resolution, StreamFormat,
    Target, VideoInfo,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestedOperation {
    Metadata,
    DirectUrl,
}

/// Inbound request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub url: String,
    /// Required for direct URLs; its presence alone implies `DirectUrl`
    #[serde(default)]
    pub format_id: Option<String>,
    /// Cookies in any accepted serialization
    #[serde(default)]
    pub cookies: Option<String>,
    #[serde(default)]
    pub operation: Option<RequestedOperation>,
}

/// Validated request ready for the orchestrator
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub target: Target,
    pub operation: Operation,
    /// Canonical Netscape text
    pub credential: Option<String>,
}

impl ResolveRequest {
    /// Reject malformed input before any tier runs.
    pub fn validate(&self) -> Result<ValidatedRequest, ResolveError> {
        let target = Target::parse(&self.url)?;

        let wants_direct = match self.operation {
            Some(RequestedOperation::DirectUrl) => true,
            Some(RequestedOperation::Metadata) => false,
            None => self.format_id.is_some(),
        };
        let operation = if wants_direct {
            let raw = self.format_id.as_deref().unwrap_or_default();
            Operation::ResolveDirectUrl(FormatSelector::new(raw)?)
        } else {
            Operation::FetchMetadata
        };

        let credential = match self.cookies.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(cookies::normalize(raw).map_err(|e| {
                ResolveError::InvalidCredential {
                    origin: CredentialSource::UserSupplied,
                    found: vec![e.to_string()],
                    required: REQUIRED_MARKERS.to_vec(),
                }
            })?),
        };

        Ok(ValidatedRequest {
            target,
            operation,
            credential,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Failure,
}

/// Outbound response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_info: Option<VideoInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formats: Option<Vec<StreamFormat>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    /// Raw engine context, supplementary only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<AttemptRecord>,
}

impl ResolveResponse {
    fn empty(status: ResponseStatus) -> Self {
        Self {
            status,
            video_info: None,
            formats: None,
            direct_url: None,
            failure_kind: None,
            error: None,
            suggestions: Vec::new(),
            details: None,
            provenance: None,
            attempts: Vec::new(),
        }
    }

    pub fn success(resolution: Resolution) -> Self {
        let mut response = Self::empty(ResponseStatus::Success);
        match resolution.payload {
            Payload::Metadata(meta) => {
                response.video_info = Some(meta.info);
                response.formats = Some(meta.formats);
            }
            Payload::DirectUrl(url) => response.direct_url = Some(url.as_str().to_string()),
        }
        response.provenance = Some(resolution.provenance);
        response.attempts = resolution.attempts;
        response
    }

    pub fn failure(error: ResolveError) -> Self {
        let mut response = Self::empty(ResponseStatus::Failure);
        response.failure_kind = error.failure_kind();
        response.suggestions = error.suggestions();
        match error {
            ResolveError::Extraction(failure) => {
                let failure = *failure;
                response.error = Some(format!("{}: {}", failure.kind, failure.message));
                response.details = failure.detail;
                response.provenance = failure.provenance;
                response.attempts = failure.attempts;
            }
            other => response.error = Some(other.to_string()),
        }
        response
    }

    pub fn from_result(result: Result<Resolution, ResolveError>) -> Self {
        match result {
            Ok(resolution) => Self::success(resolution),
            Err(error) => Self::failure(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}
