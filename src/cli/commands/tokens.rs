//! Tokens Command
//!
//! Prints the output-token cap resolved for a model id.

use std::path::Path;

use crate::ai::budget::ModelTokenTable;
use crate::types::Result;

pub fn run(model: &str, table: Option<&Path>) -> Result<()> {
    let table = match table {
        Some(path) => ModelTokenTable::from_toml_str(&std::fs::read_to_string(path)?)?,
        None => ModelTokenTable::builtin(),
    };

    match table.resolve(model) {
        Some(limit) => println!("{}: {} max output tokens", model, limit),
        None => println!("{}: provider default", model),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_with_custom_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.toml");
        std::fs::write(&path, "[models]\n\"my-model\" = 1234\n").unwrap();
        assert!(run("my-model", Some(&path)).is_ok());
        assert!(run("gpt-4o", None).is_ok());
    }

    #[test]
    fn test_run_with_missing_table() {
        assert!(run("gpt-4o", Some(Path::new("/nonexistent/tokens.toml"))).is_err());
    }
}
