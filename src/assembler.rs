//! Type checking and code generation in a single walk over the AST.
//!
//! The assembler tracks the type of every value the generated program would
//! leave on the gauge stack, allocates registers for locals, and expands
//! macros hygienically: a macro body sees its defining scope, its `$params`
//! see the caller's.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::*;
use crate::builtins::{self, BuiltinMethod};
use crate::error::{CompileError, Diagnostic};
use crate::parser;
use crate::resolve::SourceResolver;
use crate::scope::{Binding, ScopeId, Scopes};
use crate::types::{unit_type, Type};

/// Registers available to locals of one module.
pub const REGISTER_MAX: usize = 50;

/// Nesting limit for macro expansion; a macro that expands itself hits it.
pub const MAX_EXPANSION_DEPTH: usize = 64;

/// A module's text and the specifier diagnostics name it by.
#[derive(Debug, PartialEq, Eq)]
pub struct SourceFile {
    pub specifier: String,
    pub source: String,
}

#[derive(Debug, Clone)]
pub struct ExportedMacro {
    pub decl: Rc<MacroDecl>,
    pub file: Rc<SourceFile>,
}

/// Result of assembling one module.
#[derive(Debug)]
pub struct Assembly {
    pub output: String,
    pub warnings: Vec<Diagnostic>,
    pub exports: HashMap<String, ExportedMacro>,
}

pub struct Assembler<'r> {
    file: Rc<SourceFile>,
    resolver: Option<&'r dyn SourceResolver>,
    /// Specifiers of the modules currently being assembled, outermost first.
    import_chain: Vec<String>,
    stack: Vec<Type>,
    scopes: Scopes,
    scope: Option<ScopeId>,
    register: usize,
    exports: HashMap<String, ExportedMacro>,
    warnings: Vec<Diagnostic>,
    lines: Vec<String>,
    pending: Vec<String>,
    indent: usize,
    depth: usize,
}

impl<'r> Assembler<'r> {
    pub fn new(file: Rc<SourceFile>, resolver: Option<&'r dyn SourceResolver>) -> Self {
        let chain = vec![file.specifier.clone()];
        Self::with_chain(file, resolver, chain)
    }

    fn with_chain(
        file: Rc<SourceFile>,
        resolver: Option<&'r dyn SourceResolver>,
        import_chain: Vec<String>,
    ) -> Self {
        Self {
            file,
            resolver,
            import_chain,
            stack: Vec::new(),
            scopes: Scopes::default(),
            scope: None,
            register: 0,
            exports: HashMap::new(),
            warnings: Vec::new(),
            lines: Vec::new(),
            pending: Vec::new(),
            indent: 0,
            depth: 0,
        }
    }

    /// Check `program` and generate its instructions. The program's value
    /// must have type `expected`.
    pub fn assemble(mut self, program: &Program, expected: Type) -> Result<Assembly, CompileError> {
        self.visit_program(program, expected)?;
        tracing::debug!(
            specifier = %self.file.specifier,
            lines = self.lines.len(),
            warnings = self.warnings.len(),
            "assembled module"
        );
        Ok(Assembly {
            output: self.lines.join("\n"),
            warnings: self.warnings,
            exports: self.exports,
        })
    }

    // ── Output ─────────────────────────────────────────────────────

    fn emit(&mut self, token: impl Into<String>) {
        self.pending.push(token.into());
    }

    /// Flush pending tokens as one indented line.
    fn line(&mut self) {
        if !self.pending.is_empty() {
            let text = self.pending.join(" ");
            self.lines.push(format!("{}{text}", "  ".repeat(self.indent)));
            self.pending.clear();
        }
    }

    // ── Operand stack ──────────────────────────────────────────────

    fn push(&mut self, ty: Type) {
        if ty != Type::Void {
            self.stack.push(ty);
        }
    }

    fn pop(&mut self) -> Type {
        self.stack.pop().unwrap_or(Type::Void)
    }

    // ── Scopes ─────────────────────────────────────────────────────

    fn push_scope(&mut self) {
        let parent = self.scope.map(|id| self.scopes.mark(id));
        self.scope = Some(self.scopes.push(parent, self.register));
    }

    fn pop_scope(&mut self) {
        if let Some(id) = self.scope {
            self.register = self.scopes.watermark(id);
            self.scope = self.scopes.parent(id);
        }
    }

    fn resolve(&self, name: &str) -> Option<Binding> {
        self.scopes.lookup(self.scope, name).cloned()
    }

    fn declare(&mut self, name: &Ident, binding: Binding) -> Result<(), CompileError> {
        let declared = match self.scope {
            Some(at) => self.scopes.declare(at, &name.name, binding),
            None => false,
        };
        if declared {
            Ok(())
        } else {
            Err(self.fail(CompileError::syntax(
                format!("Cannot shadow or redeclare {}", name.name),
                name.span,
            )))
        }
    }

    // ── Diagnostics ────────────────────────────────────────────────

    /// Attach a frame from the file currently being walked.
    fn fail(&self, error: CompileError) -> CompileError {
        error.with_frame(&self.file.source, &self.file.specifier)
    }

    fn warn(&mut self, message: &str, span: Span) {
        let warning = Diagnostic::warning(message, span, &self.file.source, &self.file.specifier);
        self.warnings.push(warning);
    }

    fn checked_unit(&self, unit: &str, span: Span) -> Result<Type, CompileError> {
        unit_type(unit).ok_or_else(|| {
            self.fail(CompileError::type_error(format!("'{unit}' is not a valid unit"), span))
        })
    }

    fn expect_type(&self, expected: Type, actual: Type, span: Span) -> Result<(), CompileError> {
        if expected == actual {
            Ok(())
        } else {
            Err(self.fail(CompileError::type_error(
                format!("Expected {expected} but got {actual}"),
                span,
            )))
        }
    }

    // ── Statements ─────────────────────────────────────────────────

    fn visit_program(&mut self, program: &Program, expected: Type) -> Result<(), CompileError> {
        self.push_scope();
        self.visit_statements(&program.statements)?;
        self.pop_scope();
        let result = self.pop();
        if result != expected {
            let span = program.statements.last().map_or(program.span, Stmt::span);
            return Err(self.fail(CompileError::type_error(
                format!("Program expected {expected} but got {result}"),
                span,
            )));
        }
        Ok(())
    }

    fn visit_statements(&mut self, statements: &[Stmt]) -> Result<(), CompileError> {
        for stmt in statements {
            self.visit_statement(stmt)?;
            if stmt.discards_value() && self.pop() != Type::Void {
                self.warn("Unused value", stmt.span());
                self.emit("p");
            }
            self.line();
        }
        Ok(())
    }

    fn visit_statement(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Import(decl) => self.visit_import(decl),
            Stmt::Local(decl) => self.visit_local(decl),
            Stmt::Alias(decl) => self.declare(
                &decl.name,
                Binding::Alias {
                    var: decl.target.clone(),
                    span: decl.target_span,
                },
            ),
            Stmt::Macro(decl) => self.visit_macro_decl(decl),
            Stmt::Assignment(assignment) => self.visit_assignment(assignment),
            Stmt::If(node, span) => self.visit_if(node, *span, true),
            Stmt::Block(block) => self.visit_block(block, true),
            Stmt::Expr {
                expr: Expr { kind: ExprKind::Insert(var), span },
                terminated: true,
            } => self.visit_insert(var, *span, true),
            Stmt::Expr { expr, .. } => self.visit_expr(expr),
        }
    }

    fn visit_import(&mut self, decl: &ImportDecl) -> Result<(), CompileError> {
        let requested = &decl.specifier.value;
        let resolved = self
            .resolver
            .and_then(|r| r.resolve(&self.file.specifier, requested));
        let Some(resolved) = resolved else {
            return Err(self.fail(CompileError::resolution(
                format!("Could not resolve '{requested}' from '{}'", self.file.specifier),
                decl.specifier.span,
            )));
        };
        if self.import_chain.contains(&resolved.specifier) {
            return Err(self.fail(CompileError::resolution(
                format!("Circular import of '{requested}'"),
                decl.specifier.span,
            )));
        }
        tracing::debug!(
            from = %self.file.specifier,
            specifier = %resolved.specifier,
            "resolved import"
        );

        let program = parser::parse(&resolved.source, &resolved.specifier)?;
        let file = Rc::new(SourceFile {
            specifier: resolved.specifier,
            source: resolved.source,
        });
        let mut chain = self.import_chain.clone();
        chain.push(file.specifier.clone());
        let module = Assembler::with_chain(file, self.resolver, chain).assemble(&program, Type::Void)?;

        for name in &decl.names {
            let Some(export) = module.exports.get(&name.name) else {
                return Err(self.fail(CompileError::reference(
                    format!("{requested} does not export {}", name.name),
                    name.span,
                )));
            };
            self.declare(
                name,
                Binding::Macro {
                    decl: Rc::clone(&export.decl),
                    scope: None,
                    file: Rc::clone(&export.file),
                },
            )?;
        }
        Ok(())
    }

    fn visit_local(&mut self, decl: &LocalDecl) -> Result<(), CompileError> {
        self.visit_expr(&decl.value)?;
        let ty = self.pop();
        if ty == Type::Void {
            return Err(self.fail(CompileError::type_error(
                "Expected a value but got void",
                decl.value.span,
            )));
        }
        let register = self.register;
        if register >= REGISTER_MAX {
            return Err(self.fail(CompileError::range("Ran out of registers", decl.name.span)));
        }
        self.declare(&decl.name, Binding::Local { register, ty })?;
        self.register += 1;
        self.emit(format!("sp{register}"));
        Ok(())
    }

    fn visit_macro_decl(&mut self, decl: &Rc<MacroDecl>) -> Result<(), CompileError> {
        // The body sees what is bound so far, plus the macro itself.
        let scope = self.scope.map(|id| {
            let mut mark = self.scopes.mark(id);
            mark.visible += 1;
            mark
        });
        self.declare(
            &decl.name,
            Binding::Macro {
                decl: Rc::clone(decl),
                scope,
                file: Rc::clone(&self.file),
            },
        )?;
        if decl.exported {
            self.exports.insert(
                decl.name.name.clone(),
                ExportedMacro {
                    decl: Rc::clone(decl),
                    file: Rc::clone(&self.file),
                },
            );
        }
        Ok(())
    }

    fn visit_assignment(&mut self, assignment: &Assignment) -> Result<(), CompileError> {
        self.visit_expr(&assignment.value)?;
        let value = self.pop();
        let value_span = assignment.value.span;

        match &assignment.target {
            AssignTarget::SimVar(var, span) => {
                match &var.unit {
                    Some(unit) => {
                        let expected = self.checked_unit(unit, *span)?;
                        self.expect_type(expected, value, value_span)?;
                    }
                    None if value == Type::Void => {
                        return Err(self.fail(CompileError::type_error(
                            "Expected a value but got void",
                            value_span,
                        )));
                    }
                    None => {}
                }
                self.emit(format!("(>{var})"));
            }
            AssignTarget::Identifier(ident) => match self.resolve(&ident.name) {
                Some(Binding::Alias { var, span }) => {
                    let expected = match &var.unit {
                        Some(unit) => self.checked_unit(unit, span)?,
                        None => Type::Any,
                    };
                    self.expect_type(expected, value, value_span)?;
                    self.emit(format!("(>{var})"));
                }
                Some(Binding::Local { register, ty }) => {
                    self.expect_type(ty, value, value_span)?;
                    self.emit(format!("sp{register}"));
                }
                Some(_) => {
                    return Err(self.fail(CompileError::type_error(
                        format!("{} is not a local", ident.name),
                        ident.span,
                    )));
                }
                None => {
                    return Err(self.fail(CompileError::reference(
                        format!("{} is not declared", ident.name),
                        ident.span,
                    )));
                }
            },
        }
        Ok(())
    }

    // ── Expressions ────────────────────────────────────────────────

    fn visit_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match &expr.kind {
            ExprKind::Binary { op, left, right } => self.visit_binary(*op, left, right, expr.span),
            ExprKind::Unary { op, operand } => self.visit_unary(*op, operand),
            ExprKind::Method { target, callee, args } => self.visit_method(target, callee, args),
            ExprKind::MacroExpansion { name, args } => self.visit_expansion(name, args),
            ExprKind::Identifier(name) => self.visit_identifier(name, expr.span),
            ExprKind::MacroIdentifier(name) => self.visit_argument(name, expr.span),
            ExprKind::Boolean(value) => {
                self.emit(if *value { "1" } else { "0" });
                self.push(Type::Boolean);
                Ok(())
            }
            ExprKind::Number(value) => {
                // Adding +0 turns -0 into 0.
                self.emit((value + 0.0).to_string());
                self.push(Type::Number);
                Ok(())
            }
            ExprKind::Str(value) => {
                self.emit(format!("'{value}'"));
                self.push(Type::String);
                Ok(())
            }
            ExprKind::SimVar(var) => self.visit_simvar(var, expr.span),
            ExprKind::Insert(var) => self.visit_insert(var, expr.span, false),
            ExprKind::If(node) => self.visit_if(node, expr.span, false),
            ExprKind::Block(block) => self.visit_block(block, false),
        }
    }

    fn visit_binary(&mut self, op: BinOp, left: &Expr, right: &Expr, span: Span) -> Result<(), CompileError> {
        self.visit_expr(left)?;
        let lhs = self.pop();
        self.visit_expr(right)?;
        let rhs = self.pop();
        if lhs != rhs {
            return Err(self.fail(CompileError::type_error(
                format!("Expected both operands to be the same type but got {lhs} and {rhs}"),
                span,
            )));
        }

        let equality = matches!(op, BinOp::Eq | BinOp::Ne);
        let (input, output) = if equality {
            let input = match lhs {
                Type::String | Type::Boolean => lhs,
                _ => Type::Number,
            };
            (input, Type::Boolean)
        } else {
            op.signature()
        };
        self.expect_type(input, lhs, left.span)?;

        if equality && input == Type::String {
            self.emit(format!("scmp 0 {}", op.symbol()));
        } else {
            self.emit(op.opcode());
        }
        self.push(output);
        Ok(())
    }

    fn visit_unary(&mut self, op: UnaryOp, operand: &Expr) -> Result<(), CompileError> {
        self.visit_expr(operand)?;
        let (input, output) = op.signature();
        let actual = self.pop();
        self.expect_type(input, actual, operand.span)?;
        self.emit(op.opcode());
        self.push(output);
        Ok(())
    }

    fn visit_method(&mut self, target: &Expr, callee: &Ident, args: &Arguments) -> Result<(), CompileError> {
        let Some(method) = builtins::lookup(&callee.name) else {
            return Err(self.fail(CompileError::type_error(
                format!("{} is not a valid operator", callee.name),
                callee.span,
            )));
        };

        if !method.args_first {
            self.visit_receiver(method, target)?;
        }
        if args.items.len() != method.params.len() {
            return Err(self.fail(CompileError::type_error(
                format!("Expected {} arguments", method.params.len()),
                args.span,
            )));
        }
        for (arg, &param) in args.items.iter().zip(method.params) {
            self.visit_expr(arg)?;
            let actual = self.pop();
            self.expect_type(param, actual, arg.span)?;
        }
        if method.args_first {
            self.visit_receiver(method, target)?;
        }

        self.emit(method.opcode);
        self.push(method.ret);
        Ok(())
    }

    fn visit_receiver(&mut self, method: &BuiltinMethod, target: &Expr) -> Result<(), CompileError> {
        self.visit_expr(target)?;
        let actual = self.pop();
        self.expect_type(method.receiver, actual, target.span)
    }

    fn visit_expansion(&mut self, name: &Ident, args: &Arguments) -> Result<(), CompileError> {
        let Some(binding) = self.resolve(&name.name) else {
            return Err(self.fail(CompileError::reference(
                format!("{} is not declared", name.name),
                name.span,
            )));
        };
        let Binding::Macro { decl, scope, file } = binding else {
            return Err(self.fail(CompileError::type_error(
                format!("{} is not a macro", name.name),
                name.span,
            )));
        };
        if args.items.len() != decl.params.len() {
            return Err(self.fail(CompileError::syntax(
                format!("Expected {} arguments", decl.params.len()),
                args.span,
            )));
        }
        if self.depth >= MAX_EXPANSION_DEPTH {
            return Err(self.fail(CompileError::range(
                format!("Expansion of {} nests deeper than {MAX_EXPANSION_DEPTH} macros", name.name),
                name.span,
            )));
        }
        tracing::trace!(name = %name.name, depth = self.depth, "expanding macro");

        let caller_scope = self.scope;
        let caller_file = std::mem::replace(&mut self.file, file);
        self.depth += 1;
        let frame = self.scopes.push(scope, self.register);
        self.scope = Some(frame);

        let result = self.expand(&decl, args, caller_scope, &caller_file);

        self.register = self.scopes.watermark(frame);
        self.depth -= 1;
        self.scope = caller_scope;
        self.file = caller_file;
        result
    }

    /// Bind each parameter to its argument, then walk the body for its value.
    fn expand(
        &mut self,
        decl: &MacroDecl,
        args: &Arguments,
        caller_scope: Option<ScopeId>,
        caller_file: &Rc<SourceFile>,
    ) -> Result<(), CompileError> {
        for (param, arg) in decl.params.iter().zip(&args.items) {
            self.declare(
                param,
                Binding::Argument {
                    expr: Rc::clone(arg),
                    scope: caller_scope,
                    file: Rc::clone(caller_file),
                },
            )?;
        }
        self.visit_block(&decl.body, false)
    }

    fn visit_argument(&mut self, name: &str, span: Span) -> Result<(), CompileError> {
        match self.resolve(name) {
            Some(Binding::Argument { expr, scope, file }) => {
                let saved_scope = std::mem::replace(&mut self.scope, scope);
                let saved_file = std::mem::replace(&mut self.file, file);
                let result = self.visit_expr(&expr);
                self.scope = saved_scope;
                self.file = saved_file;
                result
            }
            Some(_) => Err(self.fail(CompileError::type_error(
                format!("{name} is not a macro argument"),
                span,
            ))),
            None => Err(self.fail(CompileError::reference(format!("{name} is not declared"), span))),
        }
    }

    fn visit_identifier(&mut self, name: &str, span: Span) -> Result<(), CompileError> {
        match self.resolve(name) {
            Some(Binding::Alias { var, span }) => self.visit_simvar(&var, span),
            Some(Binding::Local { register, ty }) => {
                self.emit(format!("l{register}"));
                self.push(ty);
                Ok(())
            }
            Some(_) => Err(self.fail(CompileError::type_error(format!("{name} is not a local"), span))),
            None => Err(self.fail(CompileError::reference(format!("{name} is not declared"), span))),
        }
    }

    fn visit_simvar(&mut self, var: &SimVarRef, span: Span) -> Result<(), CompileError> {
        let ty = match &var.unit {
            Some(unit) => self.checked_unit(unit, span)?,
            None => Type::Any,
        };
        self.emit(format!("({var})"));
        self.push(ty);
        Ok(())
    }

    /// `#name#`. Untyped inserts are only valid as bare statements.
    fn visit_insert(&mut self, var: &SimVarRef, span: Span, statement: bool) -> Result<(), CompileError> {
        self.emit(format!("#{}#", var.name));
        match &var.unit {
            Some(unit) => {
                let ty = self.checked_unit(unit, span)?;
                self.push(ty);
            }
            None if !statement => {
                return Err(self.fail(CompileError::type_error("Expected a type", span)));
            }
            None => {}
        }
        Ok(())
    }

    fn visit_if(&mut self, node: &IfExpr, span: Span, statement: bool) -> Result<(), CompileError> {
        self.visit_expr(&node.test)?;
        let test = self.pop();
        self.expect_type(Type::Boolean, test, node.test.span)?;

        let consequent = self.visit_branch("if{", &node.consequent)?;
        match &node.alternative {
            Some(alternative) => {
                let alternative = self.visit_branch("els{", alternative)?;
                if consequent != alternative {
                    return Err(self.fail(CompileError::type_error(
                        format!("consequent returns {consequent} but alternative returns {alternative}"),
                        span,
                    )));
                }
            }
            None if consequent != Type::Void => {
                return Err(self.fail(CompileError::syntax(
                    "If expression with consequent value must have alternative",
                    span,
                )));
            }
            None => {}
        }

        if consequent != Type::Void {
            if statement {
                return Err(self.fail(CompileError::type_error(
                    format!("Expected void but got {consequent}"),
                    span,
                )));
            }
            self.push(consequent);
        }
        Ok(())
    }

    /// Emit one branch under `open`; returns the type of the value it leaves.
    fn visit_branch(&mut self, open: &str, block: &Block) -> Result<Type, CompileError> {
        let depth = self.stack.len();
        self.emit(open);
        self.line();
        self.indent += 1;
        self.visit_block(block, false)?;
        self.indent -= 1;
        self.emit("}");
        Ok(if self.stack.len() > depth { self.pop() } else { Type::Void })
    }

    fn visit_block(&mut self, block: &Block, statement: bool) -> Result<(), CompileError> {
        self.push_scope();
        self.visit_statements(&block.statements)?;
        self.pop_scope();
        if statement {
            let value = self.pop();
            if value != Type::Void {
                return Err(self.fail(CompileError::type_error(
                    format!("Expected void but got {value}"),
                    block.span,
                )));
            }
        }
        Ok(())
    }
}
