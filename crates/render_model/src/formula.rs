//! Formula rendering
//!
//! A malformed formula never aborts the surrounding render: the failing node
//! is replaced by an inline error indicator carrying the source.

use crate::{RenderError, Result};
use quick_xml::escape::{escape, partial_escape};

/// Environments accepted inside `\begin{...}`
const KNOWN_ENVIRONMENTS: &[&str] = &[
    "aligned", "array", "bmatrix", "cases", "gathered", "matrix", "pmatrix", "split", "vmatrix",
];

/// Renders formula source to HTML
pub trait FormulaRenderer: Send + Sync {
    /// Render the source, or fail with a description of the problem
    fn render(&self, source: &str, display: bool) -> Result<String>;
}

/// Validates TeX structure and emits the escaped source as the rendered body
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatingRenderer;

impl FormulaRenderer for ValidatingRenderer {
    fn render(&self, source: &str, display: bool) -> Result<String> {
        validate(source)?;
        let class = if display { "formula-display" } else { "formula-inline" };
        Ok(format!(
            "<span class=\"{class}\">{}</span>",
            partial_escape(source.trim())
        ))
    }
}

/// Check that a formula is non-empty, its braces balance and its
/// environments are known and properly nested
pub fn validate(source: &str) -> Result<()> {
    if source.trim().is_empty() {
        return Err(RenderError::Formula("empty formula".to_string()));
    }

    let mut depth = 0usize;
    let mut escaped = false;
    for c in source.chars() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| RenderError::Formula("unexpected '}'".to_string()))?;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(RenderError::Formula(format!("{depth} unclosed '{{'")));
    }

    let mut environments: Vec<&str> = Vec::new();
    let mut rest = source;
    while let Some(index) = rest.find('\\') {
        rest = &rest[index + 1..];
        let (command, argument) = if let Some(after) = rest.strip_prefix("begin{") {
            ("begin", after)
        } else if let Some(after) = rest.strip_prefix("end{") {
            ("end", after)
        } else {
            continue;
        };
        let name = argument.split('}').next().unwrap_or_default();
        match command {
            "begin" => {
                if !KNOWN_ENVIRONMENTS.contains(&name) {
                    return Err(RenderError::Formula(format!("unknown environment '{name}'")));
                }
                environments.push(name);
            }
            _ => {
                if environments.pop() != Some(name) {
                    return Err(RenderError::Formula(format!("mismatched \\end{{{name}}}")));
                }
            }
        }
    }
    if let Some(open) = environments.last() {
        return Err(RenderError::Formula(format!("unclosed environment '{open}'")));
    }
    Ok(())
}

/// Render a formula body, falling back to an inline error indicator
pub fn render_formula_body(renderer: &dyn FormulaRenderer, source: &str, display: bool) -> String {
    match renderer.render(source, display) {
        Ok(html) => html,
        Err(e) => {
            tracing::debug!(error = %e, "formula rendered as error indicator");
            format!(
                "<span class=\"formula-error\" title=\"{}\">{}</span>",
                escape(e.to_string().as_str()),
                partial_escape(source)
            )
        }
    }
}
