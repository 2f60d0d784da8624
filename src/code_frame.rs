//! Source excerpts with underlined spans, rendered for diagnostics.
//!
//! ```text
//!  --> main.rnp:1:9
//!   |
//! 1 | let x = y;
//!   |         ^ y is not declared
//!   |
//! ```

use crate::ast::Span;

/// Render `message` against the lines of `source` covered by `span`.
///
/// Lines outside the source render as empty text.
pub fn render(source: &str, span: Span, specifier: &str, message: &str) -> String {
    let lines: Vec<&str> = source
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect();
    let line_text = |line: usize| -> &str {
        line.checked_sub(1)
            .and_then(|i| lines.get(i))
            .copied()
            .unwrap_or("")
    };

    let start = span.start;
    let end = span.end;

    if !span.is_multiline() {
        let pad = " ".repeat(start.line.to_string().len());
        let offset = start.column.saturating_sub(1);
        let length = end.column.saturating_sub(start.column).max(1);
        return format!(
            "{pad}--> {specifier}:{}:{}\n{pad} |\n{} | {}\n{pad} | {}{} {message}\n{pad} |",
            start.line,
            start.column,
            start.line,
            line_text(start.line),
            " ".repeat(offset),
            "^".repeat(length),
        );
    }

    let width = end.line.to_string().len();
    let pad = " ".repeat(width);
    let last = end.line.max(start.line);

    let mut body = Vec::with_capacity(last - start.line + 1);
    for line in start.line..=last {
        let gutter = format!("{line:>width$} | ");
        let text = line_text(line);
        if line == start.line {
            if start.column == 1 {
                body.push(format!("{gutter}/ {text}"));
            } else {
                body.push(format!(
                    "{gutter}  {text}\n{pad} | --{}^",
                    "-".repeat(start.column - 1)
                ));
            }
        } else if line == last {
            body.push(format!(
                "{gutter}| {text}\n{pad} | |_{}^ {message}",
                "_".repeat(end.column.saturating_sub(2))
            ));
        } else {
            body.push(format!("{gutter}| {text}"));
        }
    }

    format!(
        "{pad}--> {specifier}:{}:{}\n{pad} |\n{}\n{pad} |",
        start.line,
        start.column,
        body.join("\n")
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ast::Position;

    fn span(start: (usize, usize, usize), end: (usize, usize, usize)) -> Span {
        Span {
            start_index: start.0,
            end_index: end.0,
            start: Position { line: start.1, column: start.2 },
            end: Position { line: end.1, column: end.2 },
        }
    }

    #[test]
    fn single_line_underlines_the_span() {
        let source = "let x = y;";
        let out = render(source, span((8, 1, 9), (9, 1, 10)), "main", "y is not declared");
        assert_eq!(
            out,
            " --> main:1:9\n  |\n1 | let x = y;\n  |         ^ y is not declared\n  |"
        );
    }

    #[test]
    fn gutter_grows_with_line_number() {
        let source = format!("{}let abc = 1;", "\n".repeat(11));
        let out = render(&source, span((15, 12, 5), (18, 12, 8)), "m", "here");
        assert!(out.starts_with("  --> m:12:5\n   |\n12 | let abc = 1;\n"), "{out}");
        assert!(out.contains("   |     ^^^ here"), "{out}");
    }

    #[test]
    fn multi_line_from_column_one() {
        let source = "{\n  1;\n}";
        let out = render(source, span((0, 1, 1), (8, 3, 2)), "(anonymous)", "block");
        assert_eq!(
            out,
            " --> (anonymous):1:1\n  |\n1 | / {\n2 | |   1;\n3 | | }\n  | |_^ block\n  |"
        );
    }

    #[test]
    fn multi_line_from_inner_column() {
        let source = "let x = {\n  1\n};";
        let out = render(source, span((8, 1, 9), (15, 3, 2)), "f", "msg");
        assert!(out.contains("1 |   let x = {\n  | ----------^"), "{out}");
        assert!(out.contains("3 | | };\n  | |_^ msg"), "{out}");
    }

    #[test]
    fn out_of_range_lines_render_empty() {
        let out = render("", span((0, 3, 1), (1, 3, 2)), "f", "eos");
        assert!(out.contains("3 | \n"), "{out}");
    }
}
