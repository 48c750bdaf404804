// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! JSON diagnostic output for machine consumption.
//!
//! Each diagnostic carries its code, category and every label resolved to
//! 1-based line and column.

use kiln_ast::LineMap;
use serde::Serialize;

use crate::{codes::ErrorCodeRegistry, Diagnostic, LabelStyle, Severity};

/// A complete JSON diagnostic report for one module.
#[derive(Debug, Serialize)]
pub struct DiagnosticReport {
    /// Schema version for forward compatibility.
    pub version: u32,
    pub module: String,
    /// Whether compilation succeeded (no errors).
    pub success: bool,
    pub diagnostics: Vec<JsonDiagnostic>,
    pub error_count: usize,
}

#[derive(Debug, Serialize)]
pub struct JsonDiagnostic {
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Error category (e.g., "Type", "Ownership").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub message: String,
    pub labels: Vec<JsonLabel>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JsonLabel {
    pub role: LabelStyle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub start: LineCol,
    pub end: LineCol,
    /// The source line containing the start of the label.
    pub source_line: String,
}

/// Line/column pair (1-based).
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct LineCol {
    pub line: usize,
    pub column: usize,
    pub byte_offset: usize,
}

/// Convert diagnostics to a structured JSON report.
pub fn to_json_report(diagnostics: &[Diagnostic], source: &str, module: &str) -> DiagnosticReport {
    let registry = ErrorCodeRegistry::default();
    let lines = LineMap::new(source);
    let error_count = diagnostics.iter().filter(|d| d.severity == Severity::Error).count();

    DiagnosticReport {
        version: 1,
        module: module.to_string(),
        success: error_count == 0,
        diagnostics: diagnostics.iter().map(|d| to_json_diagnostic(d, source, &lines, &registry)).collect(),
        error_count,
    }
}

fn to_json_diagnostic(diag: &Diagnostic, source: &str, lines: &LineMap, registry: &ErrorCodeRegistry) -> JsonDiagnostic {
    let code = diag.code.as_ref().map(|c| c.0.clone());
    let category = code
        .as_ref()
        .and_then(|c| registry.get(c))
        .map(|info| info.category.to_string());

    let at = |offset: usize| {
        let (line, column) = lines.line_col(offset);
        LineCol { line, column, byte_offset: offset }
    };
    let labels = diag
        .labels
        .iter()
        .map(|l| {
            let start = at(l.span.start);
            let source_line = lines.line(source, start.line).unwrap_or("").to_string();
            JsonLabel {
                role: l.style,
                message: l.message.clone(),
                start,
                end: at(l.span.end),
                source_line,
            }
        })
        .collect();

    JsonDiagnostic {
        severity: diag.severity,
        code,
        category,
        message: diag.message.clone(),
        labels,
        notes: diag.notes.clone(),
        help: diag.help.clone(),
    }
}

/// Serialize a diagnostic report to pretty JSON.
pub fn to_json_string(report: &DiagnosticReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use kiln_ast::Span;

    #[test]
    fn labels_resolve_to_lines_and_columns() {
        let source = "fn main() {\n    loop { }\n}\n";
        let diag = Diagnostic::of_kind(ErrorKind::LoopWithoutContinue, "loop in `main` has no reachable `continue`")
            .with_primary(Span::new(16, 24), "this loop never repeats");
        let report = to_json_report(&[diag], source, "m");
        assert!(!report.success);
        assert_eq!(report.error_count, 1);

        let d = &report.diagnostics[0];
        assert_eq!(d.code.as_deref(), Some("K0010"));
        assert_eq!(d.category.as_deref(), Some("Ownership"));
        assert_eq!(d.labels[0].start, LineCol { line: 2, column: 5, byte_offset: 16 });
        assert_eq!(d.labels[0].source_line, "    loop { }");

        let json: serde_json::Value = serde_json::from_str(&to_json_string(&report)).unwrap();
        assert_eq!(json["diagnostics"][0]["severity"], "error");
        assert_eq!(json["diagnostics"][0]["labels"][0]["role"], "primary");
        assert!(json["diagnostics"][0].get("notes").is_none());
    }

    #[test]
    fn empty_report_is_a_success() {
        let report = to_json_report(&[], "", "m");
        assert!(report.success);
        assert_eq!(report.error_count, 0);
    }
}
