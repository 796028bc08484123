//! Assignment target collection over the parsed program

use std::collections::BTreeMap;

use py_tracer::{SourceText, RESERVED_NAME};
use ruff_python_ast::visitor::{self, Visitor};
use ruff_python_ast::{self as ast, Expr, ExprContext, Stmt};
use ruff_python_parser::parse_module;
use ruff_text_size::{Ranged, TextSize};
use serde::Serialize;

use crate::{Result, WriteAnalysisError};

/// Identifiers written on each 0-indexed line
///
/// Lines without writes have no entry. Names appear once per write, in the
/// order the assignments are evaluated on the line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct WriteMap {
    writes: BTreeMap<usize, Vec<String>>,
}

impl WriteMap {
    /// Create new empty write map
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, line: usize, name: impl Into<String>) {
        self.writes.entry(line).or_default().push(name.into());
    }

    /// Identifiers written on `line`
    pub fn at(&self, line: usize) -> &[String] {
        self.writes.get(&line).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_line(&self, line: usize) -> bool {
        self.writes.contains_key(&line)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &[String])> {
        self.writes.iter().map(|(line, names)| (*line, names.as_slice()))
    }

    /// Number of lines with at least one write
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Get number of writes across all lines
    pub fn write_count(&self) -> usize {
        self.writes.values().map(Vec::len).sum()
    }

    /// Serialize the map as JSON, keyed by line number
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Output of the write analysis
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteCollection {
    /// Identifiers written on each line
    pub writes: WriteMap,
    /// Lines blanked so that the program would parse, in repair order
    pub repaired_lines: Vec<usize>,
}

/// Collect the identifiers each line of `source` writes
///
/// # Arguments
/// * `source` - Program lines; the caller's copy is left untouched
///
/// # Returns
/// * `Ok(WriteCollection)` - Writes per line, plus any repaired lines
/// * `Err(WriteAnalysisError::Syntax)` - If the program does not parse
pub fn collect_writes(source: &SourceText) -> Result<WriteCollection> {
    tracing::info!("Collecting writes, {} source lines", source.len());

    let mut source = source.clone();
    let mut repaired_lines = Vec::new();

    let (code, module) = loop {
        let code = source.to_code();
        match parse_module(&code) {
            Ok(parsed) => break (code, parsed.into_syntax()),
            Err(err) => {
                let line = LineIndex::new(&code).line_of(err.range().start());
                let repairable = repaired_lines.len() < source.len()
                    && source.text(line).contains(RESERVED_NAME)
                    && source.blank_line(line);
                if !repairable {
                    return Err(WriteAnalysisError::Syntax {
                        line,
                        message: err.to_string(),
                    });
                }
                tracing::warn!("Blanked line {} to recover from parse error: {}", line, err);
                repaired_lines.push(line);
            }
        }
    };

    let mut collector = WriteCollector {
        lines: LineIndex::new(&code),
        writes: WriteMap::new(),
    };
    collector.visit_body(&module.body);

    tracing::info!(
        "Collected {} writes on {} lines",
        collector.writes.write_count(),
        collector.writes.len()
    );
    Ok(WriteCollection {
        writes: collector.writes,
        repaired_lines,
    })
}

/// Maps byte offsets to 0-indexed line numbers
struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    fn new(code: &str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(code.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { line_starts }
    }

    fn line_of(&self, offset: TextSize) -> usize {
        let offset = offset.to_usize();
        self.line_starts
            .partition_point(|start| *start <= offset)
            .saturating_sub(1)
    }
}

struct WriteCollector {
    lines: LineIndex,
    writes: WriteMap,
}

impl WriteCollector {
    fn record_write(&mut self, offset: TextSize, name: &str) {
        if name != RESERVED_NAME {
            self.writes.record(self.lines.line_of(offset), name);
        }
    }
}

impl<'a> Visitor<'a> for WriteCollector {
    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        // Targets before values, so a line's writes read left to right.
        match stmt {
            Stmt::Assign(ast::StmtAssign { targets, value, .. }) => {
                for target in targets {
                    self.visit_expr(target);
                }
                self.visit_expr(value);
            }
            Stmt::AugAssign(ast::StmtAugAssign { target, value, .. }) => {
                self.visit_expr(target);
                self.visit_expr(value);
            }
            Stmt::AnnAssign(ast::StmtAnnAssign {
                target,
                annotation,
                value,
                ..
            }) => {
                self.visit_expr(target);
                self.visit_annotation(annotation);
                if let Some(value) = value {
                    self.visit_expr(value);
                }
            }
            Stmt::For(ast::StmtFor {
                target,
                iter,
                body,
                orelse,
                ..
            }) => {
                self.visit_expr(target);
                self.visit_expr(iter);
                self.visit_body(body);
                self.visit_body(orelse);
            }
            _ => visitor::walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &'a Expr) {
        match expr {
            Expr::Name(name) if matches!(name.ctx, ExprContext::Store) => {
                self.record_write(name.start(), name.id.as_str());
            }
            Expr::Subscript(subscript) if matches!(subscript.ctx, ExprContext::Store) => {
                match root_identifier(&subscript.value) {
                    Some(root) => self.record_write(subscript.start(), root),
                    None => tracing::warn!(
                        "No root identifier for subscript target on line {}",
                        self.lines.line_of(subscript.start())
                    ),
                }
                return;
            }
            _ => {}
        }
        visitor::walk_expr(self, expr);
    }
}

/// The plain name at the bottom of a container access such as `a.b[0][1]`
fn root_identifier(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Name(name) => Some(name.id.as_str()),
        Expr::Subscript(ast::ExprSubscript { value, .. })
        | Expr::Attribute(ast::ExprAttribute { value, .. })
        | Expr::Starred(ast::ExprStarred { value, .. }) => root_identifier(value),
        _ => None,
    }
}
