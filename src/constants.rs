//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// HTTP transport constants shared by every HTTP-backed provider
pub mod network {
    /// Maximum automatic redirects followed per request
    pub const MAX_REDIRECTS: usize = 5;

    /// Maximum concurrent requests per destination host
    pub const MAX_CONNECTIONS_PER_HOST: usize = 200;

    /// Per-request timeout (seconds); long enough for slow streamed generations
    pub const REQUEST_TIMEOUT_SECS: u64 = 16_000;
}

/// Generation defaults
pub mod generation {
    /// Default sampling temperature
    pub const DEFAULT_TEMPERATURE: f32 = 0.5;

    /// Output cap used when a provider cannot express "provider default"
    pub const FALLBACK_MAX_TOKENS: u32 = 4096;

    /// Upper bound on model-driven tool call rounds in one request
    pub const MAX_TOOL_ROUNDS: usize = 16;
}

/// Configuration defaults
pub mod config {
    /// Default maximum number of files a single tool call may read
    pub const DEFAULT_MAX_FILE_LIMIT: usize = 10;

    /// Provider used when none is configured
    pub const DEFAULT_PROVIDER: &str = "OpenAI";

    /// Project-level configuration file
    pub const PROJECT_CONFIG_FILE: &str = "repowiki.toml";

    /// Directory (relative to the executable) holding the code-analysis prompt bundle
    pub const CODE_ANALYSIS_PLUGIN_DIR: &str = "plugins/CodeAnalysis";
}

/// Provider API constants
pub mod api {
    /// Anthropic Messages API version header value
    pub const ANTHROPIC_VERSION: &str = "2023-06-01";

    /// Azure OpenAI REST API version
    pub const AZURE_API_VERSION: &str = "2024-10-21";
}

/// Tool constants
pub mod tools {
    /// Maximum bytes returned for a single file by the file tool
    pub const MAX_FILE_BYTES: usize = 512 * 1024;

    /// Maximum files summarised by one dependency analysis call
    pub const MAX_DEPENDENCY_FILES: usize = 200;
}
