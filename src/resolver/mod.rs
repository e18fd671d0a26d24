// Resolver module - tiered yt-dlp extraction for YouTube
//
// Leaves first: credentials, fingerprint, lease, invoker, diagnostics.
// The orchestrator ties them together per request.

pub mod config;
pub mod cookies;
pub mod credentials;
pub mod diagnostics;
pub mod errors;
pub mod fingerprint;
pub mod invoker;
pub mod lease;
pub mod models;
pub mod orchestrator;
pub mod strategy;
pub mod surface;
pub mod tools;
pub mod utils;

pub use config::ResolverConfig;
pub use credentials::{Credential, CredentialSource, CredentialStore};
pub use diagnostics::{classify, FailureKind};
pub use errors::{InvokeError, PayloadDefect, ResolveError};
pub use fingerprint::{FingerprintGenerator, Identity, IdentityProfile};
pub use invoker::{ExtractionInvoker, Invocation, YtDlpInvoker};
pub use lease::{LeaseKind, LeaseStats, ResourceLease};
pub use models::{
    ExtractionFailure, FormatSelector, Operation, Payload, Provenance, Resolution, Target,
    VideoMetadata,
};
pub use orchestrator::TieredOrchestrator;
pub use strategy::{CredentialRequirement, Strategy};
pub use surface::{ResolveRequest, ResolveResponse};
pub use tools::EngineCommand;
