//! Code Analyzer Module
//!
//! Static import extraction backing the dependency-analysis tool.

pub mod dependencies;

pub use dependencies::{DependencySummary, FileDependencies, SourceLanguage, analyze_path};
