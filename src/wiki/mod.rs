//! Wiki Document Generation
//!
//! Currently a single document kind: the repository overview.

pub mod overview;

pub use overview::{
    OverviewGenerator, OverviewRequest, extract_blog, extract_document, extract_markdown_fence,
    normalize_repository_url,
};
