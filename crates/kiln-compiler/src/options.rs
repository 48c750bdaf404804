// SPDX-License-Identifier: (MIT OR Apache-2.0)

use serde::{Deserialize, Serialize};

/// Everything about a compilation that does not come from source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Call function values the inliner cannot resolve through the indirect
    /// function table instead of rejecting them.
    pub liberal: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let opts: CompileOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, CompileOptions::default());
        let opts: CompileOptions = serde_json::from_str(r#"{"liberal": true}"#).unwrap();
        assert!(opts.liberal);
    }
}
