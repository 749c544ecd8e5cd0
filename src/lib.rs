//! Lingua Dispatch - multi-provider translation dispatch library
//!
//! This library turns translation requests into Gemini, OpenAI or Claude API
//! calls with bounded retries, cached model catalogs and automatic model
//! fallback.

#![forbid(unsafe_code)]

pub mod cli;
pub mod core;
pub mod providers;

// Re-export key types for convenience
pub use core::{
    catalog::ModelCatalog,
    client::{DispatchContext, DispatchEngine, EngineBuilder},
    config::{EngineSettings, ProviderConfig},
    errors::{ErrorClass, Result, TranslationError},
    models::{ModelInfo, ProviderKind, TranslationRequest},
    retry::{CancelToken, RetryPolicy},
    store::{JsonFileStore, MemoryStore, PreferenceStore},
    transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport},
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
