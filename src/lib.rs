//! Compiler for the RNP gauge language.
//!
//! RNP is a small expression language over simulator variables ("SimVars").
//! Programs compile to reverse-polish instruction text for the simulator's
//! gauge stack machine.

pub mod ast;
pub mod builtins;
pub mod code_frame;
pub mod error;
pub mod lexer;
pub mod resolve;
pub mod scope;
pub mod types;

#[allow(clippy::wildcard_imports)]
pub mod assembler;
#[allow(clippy::wildcard_imports)]
pub mod parser;

use std::rc::Rc;

use serde::Serialize;
use ts_rs::TS;

use assembler::{Assembler, Assembly, SourceFile};
use error::CompileError;

pub use error::{Diagnostic, Level};
pub use resolve::{FsResolver, ResolvedSource, SourceResolver};
pub use types::Type;

/// Per-compilation settings.
pub struct TranslateOptions<'r> {
    /// Name of the module in diagnostics, and the referrer for its imports.
    pub specifier: String,
    /// Type the program's final value must have.
    pub expected_return_type: Type,
    /// Source of imported modules. Without one, every import fails.
    pub resolver: Option<&'r dyn SourceResolver>,
}

impl Default for TranslateOptions<'_> {
    fn default() -> Self {
        Self {
            specifier: "(anonymous)".to_string(),
            expected_return_type: Type::Void,
            resolver: None,
        }
    }
}

/// Output of [`translate`]. On failure `output` is empty and `messages`
/// holds exactly one error.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct Translation {
    pub output: String,
    pub messages: Vec<Diagnostic>,
}

impl Translation {
    pub fn is_ok(&self) -> bool {
        self.messages.iter().all(|m| m.level != Level::Error)
    }
}

/// Compile a module into gauge instruction text.
///
/// This is the public entry point for the pipeline:
/// source → lex → parse → assemble (type check + codegen, imports recursively) → text
pub fn translate(source: &str, options: &TranslateOptions<'_>) -> Translation {
    match compile(source, options) {
        Ok(assembly) => Translation {
            output: assembly.output,
            messages: assembly.warnings,
        },
        Err(error) => {
            tracing::debug!(specifier = %options.specifier, %error, "translation failed");
            Translation {
                output: String::new(),
                messages: vec![error.into_diagnostic()],
            }
        }
    }
}

fn compile(source: &str, options: &TranslateOptions<'_>) -> Result<Assembly, CompileError> {
    let program = parser::parse(source, &options.specifier)?;
    let file = Rc::new(SourceFile {
        specifier: options.specifier.clone(),
        source: source.to_string(),
    });
    Assembler::new(file, options.resolver).assemble(&program, options.expected_return_type)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn run(source: &str) -> Translation {
        translate(source, &TranslateOptions::default())
    }

    #[test]
    fn successful_translation() {
        let t = run("let x = 1 + 2;");
        assert_eq!(t.output, "1 2 + sp0");
        assert!(t.messages.is_empty());
        assert!(t.is_ok());
    }

    #[test]
    fn warnings_are_reported_alongside_output() {
        let t = run("let x = 1;\nx;");
        assert_eq!(t.output, "1 sp0\nl0 p");
        assert_eq!(t.messages.len(), 1);
        assert_eq!(t.messages[0].level, Level::Warning);
        assert_eq!(t.messages[0].location.start.line, 2);
        assert!(t.is_ok());
    }

    #[test]
    fn errors_replace_output() {
        let t = run("let x = 1;\nlet y = x + 'a';");
        assert_eq!(t.output, "");
        assert_eq!(t.messages.len(), 1);
        let m = &t.messages[0];
        assert_eq!(m.level, Level::Error);
        assert_eq!(m.message, "Expected both operands to be the same type but got number and string");
        assert!(m.detail.starts_with(" --> (anonymous):2:9\n"), "{}", m.detail);
        assert!(!t.is_ok());
    }

    #[test]
    fn lexical_and_syntax_errors_become_diagnostics() {
        let t = run("let s = 'open");
        assert_eq!(t.messages[0].message, "Unterminated string");
        let t = run("let x = 1");
        assert_eq!(t.messages[0].message, "Unexpected end of source");
    }

    #[test]
    fn specifier_and_return_type_options() {
        let options = TranslateOptions {
            specifier: "gauge.rnp".into(),
            expected_return_type: Type::Number,
            ..TranslateOptions::default()
        };
        let t = translate("(A:AIRSPEED INDICATED, knots) * 2", &options);
        assert_eq!(t.output, "(A:AIRSPEED INDICATED,knots) 2 *");

        let t = translate("'x'", &options);
        assert_eq!(t.messages[0].message, "Program expected number but got string");
        assert!(t.messages[0].detail.contains("--> gauge.rnp:1:1"));
    }

    #[test]
    fn resolver_closure_supplies_imports() {
        let resolver = |_: &str, spec: &str| {
            (spec == "util").then(|| ResolvedSource {
                source: "export macro clamp($v) { $v.max(0).min(1) }".into(),
                specifier: "util.rnp".into(),
            })
        };
        let options = TranslateOptions {
            resolver: Some(&resolver),
            ..TranslateOptions::default()
        };
        let t = translate("import { clamp } from 'util';\n(L:OUT, number) = clamp((L:IN, number));", &options);
        assert!(t.is_ok(), "{:?}", t.messages);
        assert_eq!(t.output, "(L:IN,number) 0 max 1 min\n(>L:OUT,number)");
    }

    #[test]
    fn translation_serializes_for_editors() {
        let t = run("1;");
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["output"], "1 p");
        assert_eq!(json["messages"][0]["level"], "warning");
        assert_eq!(json["messages"][0]["location"]["startIndex"], 0);
        assert_eq!(json["messages"][0]["location"]["start"]["line"], 1);
    }
}
