use super::{
    AssignOperator, AssignTarget, Expression, FunctionDecl, Identifier, ParseError, Slot, Span,
    Spanned, Statement, TemplatePart, Token, VariableDecl,
};
use crate::interpreter::builtins::BUILTIN_NAMES;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::rc::Rc;

pub type ResolveError<'code> = ParseError<'code, Token<'code>>;

/// Resolved program plus non-fatal findings (unused bindings).
#[derive(Debug)]
pub struct Resolved<'code> {
    pub statements: Vec<Spanned<Statement<'code>>>,
    pub warnings: Vec<ResolveError<'code>>,
}

/// Annotates identifier occurrences with their `Slot`, checks every name
/// against what is actually reachable, and rejects writes to immutable
/// bindings. Global bindings stay name-addressed and are visible to function
/// bodies regardless of declaration order.
pub fn resolve(
    mut statements: Vec<Spanned<Statement<'_>>>,
) -> Result<Resolved<'_>, Vec<ResolveError<'_>>> {
    let mut resolver = Resolver::default();

    // Globals are hoisted so function bodies can refer to bindings declared
    // further down. Reading a global before its declaration has run is still
    // a runtime error.
    for statement in &statements {
        match &statement.node {
            Statement::VariableDecl(decl) => {
                resolver.globals.insert(
                    decl.name.node,
                    GlobalBinding {
                        mutable: decl.mutable,
                        span: decl.name.span,
                        function: false,
                        used: false,
                    },
                );
            }
            Statement::FunctionDecl(function) => {
                resolver.globals.insert(
                    function.name.node,
                    GlobalBinding {
                        mutable: false,
                        span: function.name.span,
                        function: true,
                        used: false,
                    },
                );
            }
            _ => {}
        }
    }
    // The interpreter materializes `args` before execution and invokes `main`
    // itself, so neither counts as unused.
    resolver.globals.insert(
        "args",
        GlobalBinding {
            mutable: false,
            span: Span::from(0..0),
            function: false,
            used: true,
        },
    );
    if let Some(main) = resolver.globals.get_mut("main") {
        main.used = true;
    }

    for statement in &mut statements {
        resolver.resolve_statement(statement);
    }

    let mut unused_globals: Vec<_> = resolver
        .globals
        .iter()
        .filter(|(name, binding)| !binding.used && !binding.function && **name != "args")
        .map(|(name, binding)| (*name, binding.span))
        .collect();
    unused_globals.sort_by_key(|(_, span)| span.start);
    for (name, span) in unused_globals {
        resolver
            .warnings
            .push(ResolveError::custom(span, format!("Unused variable '{name}'")));
    }

    log::debug!(
        "resolved {} top-level statements ({} errors, {} warnings)",
        statements.len(),
        resolver.errors.len(),
        resolver.warnings.len(),
    );

    if resolver.errors.is_empty() {
        Ok(Resolved {
            statements,
            warnings: resolver.warnings,
        })
    } else {
        Err(resolver.errors)
    }
}

#[derive(Default)]
struct Resolver<'code> {
    scopes: Vec<Scope<'code>>,
    globals: FxHashMap<&'code str, GlobalBinding>,
    // Indexes into `scopes` where the innermost function's own scope starts;
    // lookups never cross it because functions only close over globals
    function_bases: Vec<usize>,
    errors: Vec<ResolveError<'code>>,
    warnings: Vec<ResolveError<'code>>,
}

#[derive(Default)]
struct Scope<'code> {
    bindings: FxHashMap<&'code str, Binding>,
    next_slot: u32,
}

struct Binding {
    slot: u32,
    mutable: bool,
    span: Span,
    initializing: bool,
    used: bool,
}

struct GlobalBinding {
    mutable: bool,
    span: Span,
    function: bool,
    used: bool,
}

enum Lookup {
    Local {
        slot: Slot,
        mutable: bool,
        initializing: bool,
    },
    Global {
        mutable: bool,
    },
    Unknown,
}

impl<'code> Resolver<'code> {
    fn resolve_statement(&mut self, statement: &mut Spanned<Statement<'code>>) {
        let Spanned {
            span,
            node: statement,
        } = statement;
        match statement {
            Statement::VariableDecl(decl) => self.resolve_variable_decl(decl),
            Statement::FunctionDecl(function) => {
                let function = Rc::get_mut(function)
                    .expect("function declarations are unshared until resolving is done");
                self.resolve_function_decl(function);
            }
            Statement::Assign {
                target,
                operator,
                value,
            } => {
                self.resolve_expression(value);
                let compound = !matches!(operator, AssignOperator::Set);
                match target {
                    AssignTarget::Name(identifier) => self.resolve_write(identifier, compound),
                    AssignTarget::Index { array, index } => {
                        let Spanned {
                            span,
                            node: identifier,
                        } = array;
                        self.resolve_read(identifier, *span);
                        self.resolve_expression(index);
                    }
                }
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expression(condition);
                self.resolve_block(then_branch);
                if let Some(else_branch) = else_branch {
                    self.resolve_block(else_branch);
                }
            }
            Statement::While { condition, body } => {
                self.resolve_expression(condition);
                self.resolve_block(body);
            }
            Statement::Return { value } => {
                if self.function_bases.is_empty() {
                    self.errors.push(ResolveError::custom(
                        *span,
                        "Cannot return outside of a function".to_owned(),
                    ));
                }
                if let Some(value) = value {
                    self.resolve_expression(value);
                }
            }
            Statement::Run { body } => self.resolve_block(body),
            Statement::Expression(expression) => self.resolve_expression(expression),
        }
    }

    fn resolve_variable_decl(&mut self, decl: &mut VariableDecl<'code>) {
        if self.scopes.is_empty() {
            // Hoisted in the pre-pass; only the initializer needs resolving
            if let Some(initializer) = &mut decl.initializer {
                self.resolve_expression(initializer);
            }
            return;
        }

        let name = decl.name.node;
        let scope = self.scopes.last_mut().expect("a local scope");
        if scope.bindings.contains_key(name) {
            self.errors.push(ResolveError::custom(
                decl.name.span,
                format!("Variable '{name}' is already declared in this scope"),
            ));
        }
        let slot = scope.next_slot;
        scope.next_slot += 1;
        scope.bindings.insert(
            name,
            Binding {
                slot,
                mutable: decl.mutable,
                span: decl.name.span,
                initializing: true,
                used: false,
            },
        );

        if let Some(initializer) = &mut decl.initializer {
            self.resolve_expression(initializer);
        }

        let scope = self.scopes.last_mut().expect("a local scope");
        if let Some(binding) = scope.bindings.get_mut(name) {
            binding.initializing = false;
        }
    }

    fn resolve_function_decl(&mut self, function: &mut FunctionDecl<'code>) {
        if !self.scopes.is_empty() {
            let name = function.name.node;
            let scope = self.scopes.last_mut().expect("a local scope");
            if scope.bindings.contains_key(name) {
                self.errors.push(ResolveError::custom(
                    function.name.span,
                    format!("Variable '{name}' is already declared in this scope"),
                ));
            }
            let slot = scope.next_slot;
            scope.next_slot += 1;
            scope.bindings.insert(
                name,
                Binding {
                    slot,
                    mutable: false,
                    span: function.name.span,
                    initializing: false,
                    used: false,
                },
            );
        }

        self.function_bases.push(self.scopes.len());
        self.scopes.push(Scope::default());
        for parameter in &function.parameters {
            let scope = self.scopes.last_mut().expect("the function scope");
            if scope.bindings.contains_key(parameter.node) {
                self.errors.push(ResolveError::custom(
                    parameter.span,
                    format!("Parameter '{}' is already declared", parameter.node),
                ));
            }
            let slot = scope.next_slot;
            scope.next_slot += 1;
            scope.bindings.insert(
                parameter.node,
                Binding {
                    slot,
                    mutable: false,
                    span: parameter.span,
                    initializing: false,
                    // Parameters are part of the signature, never reported unused
                    used: true,
                },
            );
        }
        for statement in &mut function.body {
            self.resolve_statement(statement);
        }
        self.pop_scope();
        self.function_bases.pop();
    }

    fn resolve_block(&mut self, statements: &mut [Spanned<Statement<'code>>]) {
        self.scopes.push(Scope::default());
        for statement in statements {
            self.resolve_statement(statement);
        }
        self.pop_scope();
    }

    fn pop_scope(&mut self) {
        let scope = self.scopes.pop().expect("scope stack underflow");
        let mut unused: Vec<_> = scope
            .bindings
            .into_iter()
            .filter(|(_, binding)| !binding.used)
            .collect();
        unused.sort_by_key(|(_, binding)| binding.slot);
        for (name, binding) in unused {
            self.warnings.push(ResolveError::custom(
                binding.span,
                format!("Unused variable '{name}'"),
            ));
        }
    }

    fn resolve_expression(&mut self, expression: &mut Spanned<Expression<'code>>) {
        let Spanned {
            span,
            node: expression,
        } = expression;
        match expression {
            Expression::Literal(_) => {}
            Expression::Template { parts } => {
                for part in parts {
                    if let TemplatePart::Expression(embedded) = part {
                        self.resolve_expression(embedded);
                    }
                }
            }
            Expression::Identifier(identifier) => self.resolve_read(identifier, *span),
            Expression::Unary {
                operator: _,
                operand,
            } => self.resolve_expression(operand),
            Expression::Binary {
                operator: _,
                left,
                right,
            } => {
                self.resolve_expression(left);
                self.resolve_expression(right);
            }
            Expression::Call {
                function,
                arguments,
            } => {
                self.resolve_callee(function, *span);
                for argument in arguments {
                    self.resolve_expression(argument);
                }
            }
            Expression::Index { array, index } => {
                self.resolve_expression(array);
                self.resolve_expression(index);
            }
        }
    }

    fn resolve_read(&mut self, identifier: &mut Identifier<'code>, span: Span) {
        let name = identifier.name;
        match self.lookup(name) {
            Lookup::Local {
                slot, initializing, ..
            } => {
                if initializing {
                    self.errors.push(ResolveError::custom(
                        span,
                        format!("Cannot read variable '{name}' in its own initializer"),
                    ));
                    return;
                }
                identifier.slot = Some(slot);
            }
            Lookup::Global { .. } => {}
            Lookup::Unknown => self.push_unknown_name_error(name, span),
        }
    }

    fn resolve_callee(&mut self, identifier: &mut Identifier<'code>, span: Span) {
        let name = identifier.name;
        match self.lookup(name) {
            Lookup::Local { slot, .. } => identifier.slot = Some(slot),
            Lookup::Global { .. } => {}
            Lookup::Unknown => {
                // Builtins are only reachable in call position
                if !BUILTIN_NAMES.contains(&name) {
                    self.push_unknown_name_error(name, span);
                }
            }
        }
    }

    fn resolve_write(&mut self, identifier: &mut Spanned<Identifier<'code>>, compound: bool) {
        let Spanned {
            span,
            node: identifier,
        } = identifier;
        let name = identifier.name;
        match self.lookup_for_write(name, compound) {
            Lookup::Local { slot, mutable, .. } => {
                identifier.slot = Some(slot);
                if !mutable {
                    self.errors.push(ResolveError::custom(
                        *span,
                        format!("Cannot reassign 'val' variable '{name}'"),
                    ));
                }
            }
            Lookup::Global { mutable } => {
                if !mutable {
                    self.errors.push(ResolveError::custom(
                        *span,
                        format!("Cannot reassign 'val' variable '{name}'"),
                    ));
                }
            }
            Lookup::Unknown => self.push_unknown_name_error(name, *span),
        }
    }

    fn lookup(&mut self, name: &'code str) -> Lookup {
        self.lookup_for_write(name, true)
    }

    /// A plain `=` only writes, so it does not count as a use on its own;
    /// compound operators read the old value first.
    fn lookup_for_write(&mut self, name: &'code str, counts_as_use: bool) -> Lookup {
        let base = self.function_bases.last().copied().unwrap_or(0);
        for (distance, scope) in self.scopes[base..].iter_mut().rev().enumerate() {
            if let Some(binding) = scope.bindings.get_mut(name) {
                if counts_as_use {
                    binding.used = true;
                }
                return Lookup::Local {
                    slot: Slot {
                        distance: distance as u32,
                        index: binding.slot,
                    },
                    mutable: binding.mutable,
                    initializing: binding.initializing,
                };
            }
        }
        if let Some(global) = self.globals.get_mut(name) {
            if counts_as_use {
                global.used = true;
            }
            return Lookup::Global {
                mutable: global.mutable,
            };
        }
        Lookup::Unknown
    }

    fn push_unknown_name_error(&mut self, name: &str, span: Span) {
        let reachable = self.reachable_names();
        self.errors.push(ResolveError::custom(
            span,
            format!("Cannot find the variable or function '{name}'. You can refer to: {reachable:?}"),
        ));
    }

    fn reachable_names(&self) -> BTreeSet<&'code str> {
        let base = self.function_bases.last().copied().unwrap_or(0);
        let mut names: BTreeSet<&'code str> = self.scopes[base..]
            .iter()
            .flat_map(|scope| scope.bindings.keys().copied())
            .collect();
        names.extend(self.globals.keys().copied());
        names.remove("args");
        names
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Input as _, Parser as _, Stream, lexer, parser, span_at};
    use super::*;

    fn resolve_program(code: &str) -> Result<Resolved<'_>, Vec<ResolveError<'_>>> {
        let mut tokens = lexer().parse(code).unwrap();
        tokens.retain(|token| !matches!(token.node, Token::Comment(_)));
        let input = Stream::from_iter(tokens)
            .map(span_at(code.len()), |Spanned { node, span }| (node, span));
        let statements = parser().parse(input).unwrap();
        resolve(statements)
    }

    fn first_error_message(result: Result<Resolved<'_>, Vec<ResolveError<'_>>>) -> String {
        result.expect_err("expected resolve errors")[0]
            .reason()
            .to_string()
    }

    #[test]
    fn test_local_binding_gets_slot_zero() {
        let resolved = resolve_program("run { val x = 1 println(x) }").unwrap();
        let Statement::Run { body } = &resolved.statements[0].node else {
            panic!("Expected Run");
        };
        let Statement::Expression(call) = &body[1].node else {
            panic!("Expected expression statement");
        };
        let Expression::Call { arguments, .. } = &call.node else {
            panic!("Expected Call");
        };
        let Expression::Identifier(identifier) = &arguments[0].node else {
            panic!("Expected Identifier");
        };
        assert_eq!(
            identifier.slot,
            Some(Slot {
                distance: 0,
                index: 0
            })
        );
    }

    #[test]
    fn test_enclosing_scope_read_has_distance() {
        let resolved = resolve_program("run { val a = 1 run { println(a) } }").unwrap();
        let Statement::Run { body } = &resolved.statements[0].node else {
            panic!("Expected Run");
        };
        let Statement::Run { body: inner } = &body[1].node else {
            panic!("Expected nested Run");
        };
        let Statement::Expression(call) = &inner[0].node else {
            panic!("Expected expression statement");
        };
        let Expression::Call { arguments, .. } = &call.node else {
            panic!("Expected Call");
        };
        let Expression::Identifier(identifier) = &arguments[0].node else {
            panic!("Expected Identifier");
        };
        assert_eq!(
            identifier.slot,
            Some(Slot {
                distance: 1,
                index: 0
            })
        );
    }

    #[test]
    fn test_slot_indexes_follow_declaration_order() {
        let resolved = resolve_program("run { val a = 1 val b = 2 println(b) }").unwrap();
        let Statement::Run { body } = &resolved.statements[0].node else {
            panic!("Expected Run");
        };
        let Statement::Expression(call) = &body[2].node else {
            panic!("Expected expression statement");
        };
        let Expression::Call { arguments, .. } = &call.node else {
            panic!("Expected Call");
        };
        let Expression::Identifier(identifier) = &arguments[0].node else {
            panic!("Expected Identifier");
        };
        assert_eq!(
            identifier.slot,
            Some(Slot {
                distance: 0,
                index: 1
            })
        );
    }

    #[test]
    fn test_globals_have_no_slot() {
        let resolved = resolve_program("val g = 1\nfun f() { return g }\nprintln(f())").unwrap();
        let Statement::FunctionDecl(function) = &resolved.statements[1].node else {
            panic!("Expected FunctionDecl");
        };
        let Statement::Return { value: Some(value) } = &function.body[0].node else {
            panic!("Expected Return");
        };
        let Expression::Identifier(identifier) = &value.node else {
            panic!("Expected Identifier");
        };
        assert_eq!(identifier.slot, None);
    }

    #[test]
    fn test_unknown_name_is_an_error() {
        let message = first_error_message(resolve_program("println(missing)"));
        assert!(message.contains("Cannot find the variable or function 'missing'"));
    }

    #[test]
    fn test_error_lists_reachable_names() {
        let message = first_error_message(resolve_program("val alpha = 1 run { println(beta) }"));
        assert!(message.contains("alpha"));
    }

    #[test]
    fn test_cannot_reassign_val() {
        let message = first_error_message(resolve_program("run { val x = 1 x = 2 }"));
        assert!(message.contains("Cannot reassign 'val' variable 'x'"));
    }

    #[test]
    fn test_can_reassign_var() {
        assert!(resolve_program("run { var x = 1 x = 2 println(x) }").is_ok());
    }

    #[test]
    fn test_cannot_reassign_global_val() {
        let message = first_error_message(resolve_program("val x = 1 x = 2"));
        assert!(message.contains("Cannot reassign 'val' variable 'x'"));
    }

    #[test]
    fn test_own_initializer_is_an_error() {
        let message = first_error_message(resolve_program("run { val a = a }"));
        assert!(message.contains("its own initializer"));
    }

    #[test]
    fn test_duplicate_binding_in_scope_is_an_error() {
        let message = first_error_message(resolve_program("run { val x = 1 val x = 2 }"));
        assert!(message.contains("already declared"));
    }

    #[test]
    fn test_return_outside_function_is_an_error() {
        let message = first_error_message(resolve_program("return 1"));
        assert!(message.contains("Cannot return outside of a function"));
    }

    #[test]
    fn test_functions_do_not_capture_enclosing_locals() {
        let message = first_error_message(resolve_program(
            "run { val secret = 1 fun peek() { return secret } peek() }",
        ));
        assert!(message.contains("Cannot find the variable or function 'secret'"));
    }

    #[test]
    fn test_function_parameters_resolve_in_body() {
        assert!(resolve_program("fun double(n) { return n * 2 } println(double(2))").is_ok());
    }

    #[test]
    fn test_globals_are_visible_before_their_declaration() {
        assert!(resolve_program("fun f() { return later }\nval later = 1\nprintln(f())").is_ok());
    }

    #[test]
    fn test_builtins_resolve_in_call_position() {
        assert!(resolve_program("println(sqrt(9))").is_ok());
    }

    #[test]
    fn test_builtin_name_alone_is_unknown() {
        let message = first_error_message(resolve_program("val s = sqrt println(s)"));
        assert!(message.contains("Cannot find the variable or function 'sqrt'"));
    }

    #[test]
    fn test_args_are_always_visible() {
        assert!(resolve_program("println(args)").is_ok());
    }

    #[test]
    fn test_unused_binding_warns() {
        let resolved = resolve_program("run { val unused = 1 }").unwrap();
        assert_eq!(resolved.warnings.len(), 1);
        assert!(
            resolved.warnings[0]
                .reason()
                .to_string()
                .contains("Unused variable 'unused'")
        );
    }

    #[test]
    fn test_used_binding_does_not_warn() {
        let resolved = resolve_program("run { val used = 1 println(used) }").unwrap();
        assert!(resolved.warnings.is_empty());
    }

    #[test]
    fn test_unused_global_warns() {
        let resolved = resolve_program("val lonely = 1").unwrap();
        assert_eq!(resolved.warnings.len(), 1);
        assert!(
            resolved.warnings[0]
                .reason()
                .to_string()
                .contains("Unused variable 'lonely'")
        );
    }

    #[test]
    fn test_decoy_bindings_warn_but_resolve() {
        let code = "fun bench() {
            val a = \"global\"
            run {
                val c = \"second\"
                run {
                    val x = a
                }
            }
        }
        bench()";
        let resolved = resolve_program(code).unwrap();
        let warned: Vec<_> = resolved
            .warnings
            .iter()
            .map(|warning| warning.reason().to_string())
            .collect();
        assert_eq!(warned.len(), 2);
        assert!(warned.iter().any(|message| message.contains("'c'")));
        assert!(warned.iter().any(|message| message.contains("'x'")));
    }

    #[test]
    fn test_benchmark_demo_only_warns_on_the_decoys() {
        let code = include_str!("../../../../demos/benchmark_scope.kolt");
        let resolved = resolve_program(code).unwrap();
        let warned: Vec<_> = resolved
            .warnings
            .iter()
            .map(|warning| warning.reason().to_string())
            .collect();
        // The decoys and the per-iteration aliases, nothing else
        assert_eq!(warned.len(), 6);
        for decoy in ["'c'", "'d'", "'f'", "'x'", "'y'", "'z'"] {
            assert!(
                warned.iter().any(|message| message.contains(decoy)),
                "missing unused warning for {decoy}: {warned:?}"
            );
        }
        for read in ["'a'", "'b'", "'e'"] {
            assert!(
                !warned.iter().any(|message| message.contains(read)),
                "{read} is read by the loop and must not warn: {warned:?}"
            );
        }
    }

    #[test]
    fn test_while_body_resolves_against_outer_counter() {
        let resolved =
            resolve_program("run { var i = 0 while (i < 3) { i += 1 } println(i) }").unwrap();
        let Statement::Run { body } = &resolved.statements[0].node else {
            panic!("Expected Run");
        };
        let Statement::While { body: loop_body, .. } = &body[1].node else {
            panic!("Expected While");
        };
        let Statement::Assign {
            target: AssignTarget::Name(identifier),
            ..
        } = &loop_body[0].node
        else {
            panic!("Expected assignment");
        };
        // One scope walk up: the loop body env encloses on the run block env
        assert_eq!(
            identifier.node.slot,
            Some(Slot {
                distance: 1,
                index: 0
            })
        );
    }
}
