//! Program source text and the indentation-based loop region resolver
//!
//! Everything here works on raw source lines rather than a parsed tree, so it
//! keeps working while the program is transiently invalid (the tutor traces
//! code as it is being typed).

/// Name of the no-op variable that [`SourceText::prepare`] writes on blank lines.
///
/// The tracer never records it and the write analysis never reports it.
pub const RESERVED_NAME: &str = "__run_py__";

/// Indentation added below a line that opens a block
const BLOCK_INDENT: &str = "    ";

/// Ordered source lines of the traced program, 0-indexed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceText {
    lines: Vec<String>,
}

impl SourceText {
    /// Split program text into lines, exactly as written
    pub fn new(code: &str) -> Self {
        Self {
            lines: code.lines().map(str::to_string).collect(),
        }
    }

    /// Split program text into lines and prepare it for tracing
    ///
    /// Comments are stripped and blank lines become `__run_py__ = 0`, so that
    /// every line the user sees gets a step of its own. A blank line right
    /// after a block opener is indented into that block; any other blank line
    /// takes the indentation of the next non-blank line below it. The first
    /// line is left alone.
    pub fn prepare(code: &str) -> Self {
        let mut lines: Vec<String> = code
            .lines()
            .map(|line| strip_comment(line).to_string())
            .collect();

        let mut block_indent: Option<String> = None;
        for line in lines.iter_mut() {
            if is_blank(line) {
                if let Some(indent) = &block_indent {
                    *line = format!("{indent}{BLOCK_INDENT}");
                }
            } else if line.trim_end().ends_with(':') {
                block_indent = Some(leading_whitespace(line).to_string());
            } else {
                block_indent = None;
            }
        }

        let mut below = String::new();
        for n in (1..lines.len()).rev() {
            let line = &lines[n];
            if is_blank(line) {
                let indent = if line.len() > below.len() { line.as_str() } else { below.as_str() };
                let noop = format!("{indent}{RESERVED_NAME} = 0");
                lines[n] = noop;
            } else {
                below = leading_whitespace(line).to_string();
            }
        }

        Self { lines }
    }

    /// All lines, in order
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Line `n`, if the program has one
    pub fn line(&self, n: usize) -> Option<&str> {
        self.lines.get(n).map(String::as_str)
    }

    /// Text of line `n`, or an empty string past the end of the program
    pub fn text(&self, n: usize) -> &str {
        self.line(n).unwrap_or("")
    }

    /// Number of lines
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Indentation of line `n`
    pub fn indent_of(&self, n: usize) -> usize {
        indentation(self.text(n))
    }

    /// Whether line `n` introduces a `for` or `while` loop
    pub fn is_loop_header(&self, n: usize) -> bool {
        is_loop_header(self.text(n))
    }

    /// Lines forming the body of the loop whose header is on line `header`
    ///
    /// The body is every following line indented deeper than the header, up to
    /// the first non-blank line that is not. Blank lines are skipped and never
    /// end the scan.
    pub fn loop_body(&self, header: usize) -> Vec<usize> {
        let baseline = self.indent_of(header);
        let mut body = Vec::new();
        for (n, line) in self.lines.iter().enumerate().skip(header + 1) {
            if is_blank(line) {
                continue;
            }
            if indentation(line) <= baseline {
                break;
            }
            body.push(n);
        }
        body
    }

    /// Replace line `n` with an empty line
    ///
    /// Returns false when there is no such line or it is already blank.
    pub fn blank_line(&mut self, n: usize) -> bool {
        match self.lines.get_mut(n) {
            Some(line) if !line.is_empty() => {
                line.clear();
                true
            }
            _ => false,
        }
    }

    /// Reassemble the program text handed to the parser and to the host
    pub fn to_code(&self) -> String {
        let mut code = self.lines.join("\n");
        code.push('\n');
        code
    }
}

/// Whether a line carries no code
pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Count of leading whitespace characters
pub fn indentation(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

fn leading_whitespace(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

/// Cut a trailing `#` comment, ignoring `#` inside string literals
pub fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '#' => return &line[..i],
                '\'' | '"' => quote = Some(c),
                _ => {}
            },
        }
    }
    line
}

/// Whether a line has the shape `for ... :` or `while ... :`
///
/// Textual check only, so it also works on code that does not parse.
pub fn is_loop_header(line: &str) -> bool {
    let stmt = strip_comment(line).trim();
    let stmt = match stmt.strip_prefix("async") {
        Some(rest) if rest.starts_with(char::is_whitespace) => rest.trim_start(),
        _ => stmt,
    };
    (starts_with_keyword(stmt, "for") || starts_with_keyword(stmt, "while")) && stmt.ends_with(':')
}

/// Whether a line contains a `break` statement
pub fn is_break(line: &str) -> bool {
    contains_keyword(line, "break")
}

/// Whether a line contains a `return` statement
pub fn is_return(line: &str) -> bool {
    contains_keyword(line, "return")
}

/// Whether a line can suspend its frame (`yield` or `await`)
///
/// A return event from such a line does not end the frame.
pub fn is_suspension(line: &str) -> bool {
    contains_keyword(line, "yield") || contains_keyword(line, "await")
}

fn is_ident_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

fn starts_with_keyword(stmt: &str, keyword: &str) -> bool {
    stmt.strip_prefix(keyword)
        .is_some_and(|rest| !rest.starts_with(is_ident_char))
}

/// Whether `keyword` appears as a whole word outside string literals and comments
fn contains_keyword(line: &str, keyword: &str) -> bool {
    let code = strip_comment(line);
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut word_start: Option<usize> = None;

    for (i, c) in code.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        if is_ident_char(c) {
            word_start.get_or_insert(i);
            continue;
        }
        if let Some(start) = word_start.take() {
            if &code[start..i] == keyword {
                return true;
            }
        }
        if c == '\'' || c == '"' {
            quote = Some(c);
        }
    }

    word_start.is_some_and(|start| &code[start..] == keyword)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indentation_counts_leading_whitespace() {
        assert_eq!(indentation("x = 1"), 0);
        assert_eq!(indentation("    x = 1"), 4);
        assert_eq!(indentation("\t\tx"), 2);
        assert_eq!(indentation(""), 0);
    }

    #[test]
    fn test_loop_header_classifier() {
        assert!(is_loop_header("for i in range(3):"));
        assert!(is_loop_header("    while x < 10:   "));
        assert!(is_loop_header("for i in range(3):  # count up"));
        assert!(is_loop_header("while(x):"));
        assert!(is_loop_header("async for item in stream:"));

        assert!(!is_loop_header("if x:"));
        assert!(!is_loop_header("format = 1"));
        assert!(!is_loop_header("forward(x):"));
        assert!(!is_loop_header("x = [i for i in y]"));
        assert!(!is_loop_header("for i in range(3)"));
    }

    #[test]
    fn test_break_and_return_classifiers() {
        assert!(is_break("        break"));
        assert!(is_break("if done: break"));
        assert!(!is_break("breakpoint()"));
        assert!(!is_break("msg = 'break'"));

        assert!(is_return("    return x + 1"));
        assert!(is_return("return"));
        assert!(!is_return("returned = True"));
        assert!(!is_return("x = 1  # return later"));
    }

    #[test]
    fn test_suspension_points() {
        assert!(is_suspension("        yield i"));
        assert!(is_suspension("x = yield"));
        assert!(is_suspension("    data = await fetch()"));
        assert!(!is_suspension("yielded = 3"));
        assert!(!is_suspension("print('yield')"));
    }

    #[test]
    fn test_strip_comment_respects_strings() {
        assert_eq!(strip_comment("x = 1  # note"), "x = 1  ");
        assert_eq!(strip_comment("s = '#not a comment'"), "s = '#not a comment'");
        assert_eq!(strip_comment(r##"s = "a\"#b" # c"##), r##"s = "a\"#b" "##);
        assert_eq!(strip_comment("# only"), "");
    }

    #[test]
    fn test_loop_body_by_indentation() {
        let source = SourceText::new(
            "total = 0\nfor i in range(3):\n    total += i\n\n    total *= 2\nprint(total)\n",
        );

        assert_eq!(source.loop_body(1), vec![2, 4]);
        assert!(source.is_loop_header(1));
        assert!(!source.is_loop_header(2));
    }

    #[test]
    fn test_loop_body_nested_and_at_end_of_source() {
        let source = SourceText::new("for i in a:\n    for j in b:\n        x = i\n    y = j");

        assert_eq!(source.loop_body(0), vec![1, 2, 3]);
        assert_eq!(source.loop_body(1), vec![2]);
    }

    #[test]
    fn test_prepare_replaces_blank_lines_with_noop() {
        let source = SourceText::prepare("x = 1\n\nfor i in range(2):\n\n    x += i\n# done\ny = x\n");

        assert_eq!(
            source.lines(),
            &[
                "x = 1".to_string(),
                "__run_py__ = 0".to_string(),
                "for i in range(2):".to_string(),
                "    __run_py__ = 0".to_string(),
                "    x += i".to_string(),
                "__run_py__ = 0".to_string(),
                "y = x".to_string(),
            ]
        );
    }

    #[test]
    fn test_prepare_keeps_first_line_and_longer_user_indent() {
        let source = SourceText::prepare("\nx = 1\n        \ny = 2\n");

        assert_eq!(source.text(0), "");
        assert_eq!(source.text(2), "        __run_py__ = 0");

        let source = SourceText::prepare("if x:\n        \n    y = 1\n");
        assert_eq!(source.text(1), "    __run_py__ = 0");
    }

    #[test]
    fn test_blank_line_and_to_code() {
        let mut source = SourceText::new("a = 1\nb = 2");

        assert!(source.blank_line(1));
        assert!(!source.blank_line(1));
        assert!(!source.blank_line(7));
        assert_eq!(source.to_code(), "a = 1\n\n");
    }
}
