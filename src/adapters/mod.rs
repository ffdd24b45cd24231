// Concrete collaborators: storage-backed files, HTTP services, built-in fallbacks.

pub mod file;
pub mod http;
pub mod offline;

pub use file::{StorageKnowledgeSource, StorageMetricsSource};
pub use http::{
    HttpEndpoint, HttpKnowledgeSource, HttpMetricsSource, HttpNarrativeGenerator, HttpSearchClient,
};
pub use offline::{BuiltinKnowledgeSource, OfflineSearchClient, TemplateNarrative};
