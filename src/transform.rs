//! Reactive transform.
//!
//! Rewrites reads of reactive identifiers into `$get(x)`, writes into
//! `$set(x, ...)` and in-place mutations into `(mutation, $notify(x))`, while
//! honouring every binding that shadows a reactive name. The visitor works
//! post-order: children are rewritten first, then the node itself.

use oxc_allocator::{Allocator, Box as OxcBox, CloneIn};
use oxc_ast::ast::*;
use oxc_ast::AstBuilder;
use oxc_ast_visit::walk_mut::{
    walk_arrow_function_expression, walk_block_statement, walk_catch_clause, walk_expression,
    walk_for_in_statement, walk_for_of_statement, walk_for_statement, walk_function,
    walk_object_property,
};
use oxc_ast_visit::VisitMut;
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::{SourceType, SPAN};
use oxc_syntax::number::NumberBase;
use oxc_syntax::operator::BinaryOperator;
use oxc_syntax::scope::ScopeFlags;
use oxc_transformer::{TransformOptions, Transformer};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use crate::error::{CompileError, Result};
use crate::scope::{
    collect_pattern_names, hoisted_var_names, lexical_names, simple_pattern_name, ScopeChain,
};
use crate::template::{self, Span};

pub const GET: &str = "$get";
pub const SET: &str = "$set";
pub const NOTIFY: &str = "$notify";
pub const DERIVED: &str = "$derived";

/// Methods that mutate their receiver in place (arrays, maps and sets).
pub const MUTATING_METHODS: &[&str] = &[
    "push",
    "pop",
    "shift",
    "unshift",
    "splice",
    "sort",
    "reverse",
    "fill",
    "copyWithin",
    "set",
    "delete",
    "clear",
    "add",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformMode {
    /// Whole component or module script. Function parameters must be plain names.
    Script,
    /// A single template expression. Any parameter pattern is accepted.
    Expression,
}

/// Template expressions accept TypeScript casts in either script language.
pub fn source_type() -> SourceType {
    script_source_type(true)
}

pub fn script_source_type(typescript: bool) -> SourceType {
    SourceType::default().with_module(true).with_typescript(typescript)
}

// ═══════════════════════════════════════════════════════════════════════════════
// REACTIVE TRANSFORM VISITOR
// ═══════════════════════════════════════════════════════════════════════════════

pub struct ReactiveTransform<'a, 'r> {
    ast: AstBuilder<'a>,
    reactive: &'r HashSet<String>,
    scopes: ScopeChain,
    mode: TransformMode,
    /// Reactive names wrapped in `$get` at least once.
    pub reads: BTreeSet<String>,
    error: Option<CompileError>,
}

impl<'a, 'r> ReactiveTransform<'a, 'r> {
    pub fn new(allocator: &'a Allocator, reactive: &'r HashSet<String>, mode: TransformMode) -> Self {
        Self {
            ast: AstBuilder::new(allocator),
            reactive,
            scopes: ScopeChain::new(),
            mode,
            reads: BTreeSet::new(),
            error: None,
        }
    }

    /// Seed the chain with names bound by enclosing template blocks.
    pub fn with_locals(mut self, locals: &HashSet<String>) -> Self {
        self.scopes = ScopeChain::with_base(locals);
        self
    }

    /// First error hit while visiting, if any.
    pub fn finish(self) -> Result<BTreeSet<String>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.reads),
        }
    }

    fn fail(&mut self, err: CompileError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn is_reactive(&self, name: &str) -> bool {
        self.reactive.contains(name) && !self.scopes.contains(name)
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Node construction
    // ───────────────────────────────────────────────────────────────────────────

    fn ident(&self, name: &str) -> Expression<'a> {
        let name: &'a str = self.ast.allocator.alloc_str(name);
        self.ast.expression_identifier(SPAN, name)
    }

    fn call(&self, callee: &str, args: Vec<Expression<'a>>) -> Expression<'a> {
        let mut arguments = self.ast.vec();
        for arg in args {
            arguments.push(Argument::from(arg));
        }
        self.ast.expression_call(
            SPAN,
            self.ident(callee),
            None::<OxcBox<TSTypeParameterInstantiation>>,
            arguments,
            false,
        )
    }

    fn get_call(&mut self, name: &str) -> Expression<'a> {
        log::trace!("rewriting read of {} to {}({})", name, GET, name);
        self.reads.insert(name.to_string());
        let cell = self.ident(name);
        self.call(GET, vec![cell])
    }

    fn set_call(&self, name: &str, value: Expression<'a>) -> Expression<'a> {
        log::trace!("rewriting write of {} to {}", name, SET);
        self.call(SET, vec![self.ident(name), value])
    }

    /// `(mutation, $notify(root))`
    fn with_notify(&self, mutation: Expression<'a>, root: &str) -> Expression<'a> {
        log::trace!("appending {}({}) after mutation", NOTIFY, root);
        let mut items = self.ast.vec();
        items.push(mutation);
        items.push(self.call(NOTIFY, vec![self.ident(root)]));
        self.ast.expression_sequence(SPAN, items)
    }

    fn one(&self) -> Expression<'a> {
        self.ast
            .expression_numeric_literal(SPAN, 1.0, None, NumberBase::Decimal)
    }

    /// `() => body`, built by parsing a template arrow and splicing the body in.
    fn thunk(&self, body: Expression<'a>) -> Option<Expression<'a>> {
        let source: &'a str = self.ast.allocator.alloc_str("() => 0");
        let mut arrow = Parser::new(self.ast.allocator, source, SourceType::mjs())
            .parse_expression()
            .ok()?;
        if let Expression::ArrowFunctionExpression(func) = &mut arrow {
            if let Some(Statement::ExpressionStatement(stmt)) = func.body.statements.first_mut() {
                stmt.expression = body;
                return Some(arrow);
            }
        }
        None
    }

    /// Reactive cell a member chain hangs off, i.e. the `x` of `$get(x).a.b`.
    fn member_root(&self, expr: &Expression<'a>) -> Option<String> {
        match expr {
            Expression::CallExpression(call) => cell_argument(call, GET),
            Expression::StaticMemberExpression(member) => self.member_root(&member.object),
            Expression::ComputedMemberExpression(member) => self.member_root(&member.object),
            Expression::PrivateFieldExpression(member) => self.member_root(&member.object),
            Expression::ParenthesizedExpression(paren) => self.member_root(&paren.expression),
            _ => None,
        }
    }

    fn assignment_member_root(&self, target: &AssignmentTarget<'a>) -> Option<String> {
        match target {
            AssignmentTarget::StaticMemberExpression(member) => self.member_root(&member.object),
            AssignmentTarget::ComputedMemberExpression(member) => self.member_root(&member.object),
            AssignmentTarget::PrivateFieldExpression(member) => self.member_root(&member.object),
            _ => None,
        }
    }

    fn update_member_root(&self, target: &SimpleAssignmentTarget<'a>) -> Option<String> {
        match target {
            SimpleAssignmentTarget::StaticMemberExpression(member) => {
                self.member_root(&member.object)
            }
            SimpleAssignmentTarget::ComputedMemberExpression(member) => {
                self.member_root(&member.object)
            }
            SimpleAssignmentTarget::PrivateFieldExpression(member) => {
                self.member_root(&member.object)
            }
            _ => None,
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Scope frames
    // ───────────────────────────────────────────────────────────────────────────

    fn parameter_frame(&mut self, params: &FormalParameters<'a>) -> HashSet<String> {
        let mut frame = HashSet::new();
        for param in &params.items {
            match (self.mode, simple_pattern_name(&param.pattern)) {
                (_, Some(name)) => {
                    frame.insert(name.to_string());
                }
                (TransformMode::Expression, None) => {
                    collect_pattern_names(&param.pattern, &mut frame);
                }
                (TransformMode::Script, None) => {
                    collect_pattern_names(&param.pattern, &mut frame);
                    self.fail(CompileError::analysis(
                        "Destructured function parameters are not supported in component scripts. \
                         Take the parameter by name and destructure it inside the function body.",
                        Span::from(param.span),
                    ));
                }
            }
        }
        if let Some(rest) = &params.rest {
            collect_pattern_names(&rest.rest.argument, &mut frame);
        }
        frame
    }

    fn body_frame(statements: &[Statement<'a>]) -> HashSet<String> {
        let mut frame = lexical_names(statements);
        frame.extend(hoisted_var_names(statements));
        frame
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Rewrites applied after children are visited
    // ───────────────────────────────────────────────────────────────────────────

    fn rewrite_assignment(&mut self, expr: &mut Expression<'a>) {
        let Expression::AssignmentExpression(assign) = expr else {
            return;
        };

        if let AssignmentTarget::AssignmentTargetIdentifier(id) = &assign.left {
            let name = id.name.to_string();
            if !self.is_reactive(&name) {
                return;
            }
            let rhs = assign.right.clone_in(self.ast.allocator);
            let value = if assign.operator == AssignmentOperator::Assign {
                rhs
            } else if let Some(op) = assign.operator.to_logical_operator() {
                let current = self.get_call(&name);
                self.ast.expression_logical(SPAN, current, op, rhs)
            } else if let Some(op) = assign.operator.to_binary_operator() {
                let current = self.get_call(&name);
                self.ast.expression_binary(SPAN, current, op, rhs)
            } else {
                return;
            };
            *expr = self.set_call(&name, value);
            return;
        }

        if let Some(root) = self.assignment_member_root(&assign.left) {
            let mutation = expr.clone_in(self.ast.allocator);
            *expr = self.with_notify(mutation, &root);
        }
    }

    fn rewrite_update(&mut self, expr: &mut Expression<'a>) {
        let Expression::UpdateExpression(update) = expr else {
            return;
        };

        if let SimpleAssignmentTarget::AssignmentTargetIdentifier(id) = &update.argument {
            let name = id.name.to_string();
            if !self.is_reactive(&name) {
                return;
            }
            let op = match update.operator {
                UpdateOperator::Increment => BinaryOperator::Addition,
                UpdateOperator::Decrement => BinaryOperator::Subtraction,
            };
            let current = self.get_call(&name);
            let value = self.ast.expression_binary(SPAN, current, op, self.one());
            *expr = self.set_call(&name, value);
            return;
        }

        if let Some(root) = self.update_member_root(&update.argument) {
            let mutation = expr.clone_in(self.ast.allocator);
            *expr = self.with_notify(mutation, &root);
        }
    }

    fn rewrite_call(&mut self, expr: &mut Expression<'a>) {
        let Expression::CallExpression(call) = expr else {
            return;
        };

        // $derived.by(fn) -> $derived(fn)
        if let Expression::StaticMemberExpression(member) = &call.callee {
            if matches!(&member.object, Expression::Identifier(id) if id.name == DERIVED)
                && member.property.name == "by"
            {
                call.callee = self.ident(DERIVED);
                return;
            }
        }

        // $derived(expr) -> $derived(() => expr)
        if matches!(&call.callee, Expression::Identifier(id) if id.name == DERIVED) {
            if let Some(first) = call.arguments.first_mut() {
                let is_function = matches!(
                    first,
                    Argument::ArrowFunctionExpression(_) | Argument::FunctionExpression(_)
                );
                if !is_function {
                    if let Some(body) = first.as_expression() {
                        let body = body.clone_in(self.ast.allocator);
                        if let Some(thunk) = self.thunk(body) {
                            *first = Argument::from(thunk);
                        }
                    }
                }
            }
            return;
        }

        let root = match &call.callee {
            Expression::StaticMemberExpression(member)
                if MUTATING_METHODS.contains(&member.property.name.as_str()) =>
            {
                self.member_root(&member.object)
            }
            _ => None,
        };
        if let Some(root) = root {
            let mutation = expr.clone_in(self.ast.allocator);
            *expr = self.with_notify(mutation, &root);
        }
    }
}

/// The identifier passed as the cell argument of a runtime call such as `$get(x)`.
fn cell_argument(call: &CallExpression, primitive: &str) -> Option<String> {
    match (&call.callee, call.arguments.first()) {
        (Expression::Identifier(callee), Some(Argument::Identifier(arg)))
            if callee.name == primitive =>
        {
            Some(arg.name.to_string())
        }
        _ => None,
    }
}

fn is_notified_mutation(seq: &SequenceExpression) -> bool {
    match seq.expressions.last() {
        Some(Expression::CallExpression(call)) if seq.expressions.len() == 2 => {
            cell_argument(call, NOTIFY).is_some()
        }
        _ => false,
    }
}

fn is_cell_primitive(call: &CallExpression) -> bool {
    matches!(&call.callee, Expression::Identifier(id)
        if id.name == GET || id.name == SET || id.name == NOTIFY)
}

impl<'a, 'r> VisitMut<'a> for ReactiveTransform<'a, 'r> {
    fn visit_expression(&mut self, expr: &mut Expression<'a>) {
        // Type-only wrappers vanish from template expressions.
        let inner = match expr {
            Expression::TSAsExpression(e) => Some(e.expression.clone_in(self.ast.allocator)),
            Expression::TSSatisfiesExpression(e) => Some(e.expression.clone_in(self.ast.allocator)),
            Expression::TSNonNullExpression(e) => Some(e.expression.clone_in(self.ast.allocator)),
            Expression::TSTypeAssertion(e) => Some(e.expression.clone_in(self.ast.allocator)),
            _ => None,
        };
        if let Some(inner) = inner {
            *expr = inner;
            self.visit_expression(expr);
            return;
        }

        // Reads
        if let Expression::Identifier(id) = expr {
            let name = id.name.to_string();
            if self.is_reactive(&name) {
                *expr = self.get_call(&name);
            }
            return;
        }

        // `(mutation, $notify(x))` was already rewritten: only its operands are visited.
        if let Expression::SequenceExpression(seq) = expr {
            if is_notified_mutation(seq) {
                if let Some(mutation) = seq.expressions.first_mut() {
                    walk_expression(self, mutation);
                }
                return;
            }
        }

        // Already a cell operation: leave the cell argument alone.
        if let Expression::CallExpression(call) = expr {
            if is_cell_primitive(call) {
                for (index, arg) in call.arguments.iter_mut().enumerate() {
                    if index == 0 && matches!(arg, Argument::Identifier(_)) {
                        continue;
                    }
                    self.visit_argument(arg);
                }
                return;
            }
        }

        walk_expression(self, expr);

        match expr {
            Expression::AssignmentExpression(_) => self.rewrite_assignment(expr),
            Expression::UpdateExpression(_) => self.rewrite_update(expr),
            Expression::CallExpression(_) => self.rewrite_call(expr),
            _ => {}
        }
    }

    fn visit_object_property(&mut self, prop: &mut ObjectProperty<'a>) {
        if prop.shorthand {
            if let Expression::Identifier(id) = &prop.value {
                if self.is_reactive(&id.name) {
                    prop.shorthand = false;
                }
            }
        }
        walk_object_property(self, prop);
    }

    fn visit_function(&mut self, func: &mut Function<'a>, flags: ScopeFlags) {
        let mut frame = self.parameter_frame(&func.params);
        if let Some(id) = &func.id {
            frame.insert(id.name.to_string());
        }
        if let Some(body) = &func.body {
            frame.extend(Self::body_frame(&body.statements));
        }
        self.scopes.push(frame);
        walk_function(self, func, flags);
        self.scopes.pop();
    }

    fn visit_arrow_function_expression(&mut self, arrow: &mut ArrowFunctionExpression<'a>) {
        let mut frame = self.parameter_frame(&arrow.params);
        frame.extend(Self::body_frame(&arrow.body.statements));
        self.scopes.push(frame);
        walk_arrow_function_expression(self, arrow);
        self.scopes.pop();
    }

    fn visit_catch_clause(&mut self, clause: &mut CatchClause<'a>) {
        let mut frame = HashSet::new();
        if let Some(param) = &clause.param {
            collect_pattern_names(&param.pattern, &mut frame);
        }
        self.scopes.push(frame);
        walk_catch_clause(self, clause);
        self.scopes.pop();
    }

    fn visit_block_statement(&mut self, block: &mut BlockStatement<'a>) {
        self.scopes.push(lexical_names(&block.body));
        walk_block_statement(self, block);
        self.scopes.pop();
    }

    fn visit_for_statement(&mut self, stmt: &mut ForStatement<'a>) {
        let mut frame = HashSet::new();
        if let Some(ForStatementInit::VariableDeclaration(decl)) = &stmt.init {
            for declarator in &decl.declarations {
                collect_pattern_names(&declarator.id, &mut frame);
            }
        }
        self.scopes.push(frame);
        walk_for_statement(self, stmt);
        self.scopes.pop();
    }

    fn visit_for_of_statement(&mut self, stmt: &mut ForOfStatement<'a>) {
        self.scopes.push(loop_left_names(&stmt.left));
        walk_for_of_statement(self, stmt);
        self.scopes.pop();
    }

    fn visit_for_in_statement(&mut self, stmt: &mut ForInStatement<'a>) {
        self.scopes.push(loop_left_names(&stmt.left));
        walk_for_in_statement(self, stmt);
        self.scopes.pop();
    }
}

fn loop_left_names(left: &ForStatementLeft) -> HashSet<String> {
    let mut frame = HashSet::new();
    if let ForStatementLeft::VariableDeclaration(decl) = left {
        for declarator in &decl.declarations {
            collect_pattern_names(&declarator.id, &mut frame);
        }
    }
    frame
}

// ═══════════════════════════════════════════════════════════════════════════════
// CODE GENERATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Print a whole program.
pub fn print_program(program: &Program) -> String {
    Codegen::new().build(program).code
}

/// Print a single expression, parenthesizing comma sequences so the text can
/// be dropped into any expression position.
pub fn print_expression<'a>(allocator: &'a Allocator, expr: &Expression<'a>) -> String {
    let ast = AstBuilder::new(allocator);
    let mut body = ast.vec();
    body.push(ast.statement_expression(SPAN, expr.clone_in(allocator)));
    let program = Program {
        span: SPAN,
        source_type: SourceType::mjs(),
        hashbang: None,
        directives: ast.vec(),
        body,
        source_text: "",
        comments: ast.vec(),
        scope_id: std::cell::Cell::new(None),
    };
    let code = print_program(&program);
    let code = code.trim().trim_end_matches(';').trim_end().to_string();
    if matches!(expr, Expression::SequenceExpression(_)) {
        format!("({})", code)
    } else {
        code
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPLATE EXPRESSIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Syntactic shape of a template expression before rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpressionShape {
    Identifier(String),
    /// Arrow function or function expression.
    Function,
    Other,
}

#[derive(Debug, Clone)]
pub struct RewrittenExpression {
    pub code: String,
    pub shape: ExpressionShape,
    /// Reactive names read by the expression outside any shadowing scope.
    pub reads: BTreeSet<String>,
}

impl RewrittenExpression {
    pub fn is_reactive(&self) -> bool {
        !self.reads.is_empty()
    }
}

/// Parse and rewrite one template expression. The caller's `locals` are the
/// binders of enclosing template blocks and always shadow reactive names.
pub fn transform_expression(
    expression: &template::Expression,
    reactive: &HashSet<String>,
    locals: &HashSet<String>,
) -> Result<RewrittenExpression> {
    let allocator = Allocator::default();
    let mut expr = parse_template_expression(&allocator, expression)?;

    let shape = match &expr {
        Expression::Identifier(id) => ExpressionShape::Identifier(id.name.to_string()),
        Expression::ArrowFunctionExpression(_) | Expression::FunctionExpression(_) => {
            ExpressionShape::Function
        }
        _ => ExpressionShape::Other,
    };

    let mut transform = ReactiveTransform::new(&allocator, reactive, TransformMode::Expression)
        .with_locals(locals);
    transform.visit_expression(&mut expr);
    let reads = transform
        .finish()
        .map_err(|err| err.offset(expression.span.start))?;

    Ok(RewrittenExpression {
        code: print_expression(&allocator, &expr),
        shape,
        reads,
    })
}

/// Parse a template expression in the given allocator, mapping syntax errors
/// onto the expression's span in the component file.
pub fn parse_template_expression<'a>(
    allocator: &'a Allocator,
    expression: &template::Expression,
) -> Result<Expression<'a>> {
    let code: &'a str = allocator.alloc_str(&expression.code);
    Parser::new(allocator, code, source_type())
        .parse_expression()
        .map_err(|errors| {
            let detail = errors
                .first()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "invalid syntax".to_string());
            CompileError::analysis(
                format!("Invalid expression `{}`: {}", expression.code, detail),
                expression.span,
            )
        })
}

/// Names bound by an each-block context pattern such as `item` or `{ id, name }`.
pub fn pattern_binding_names(pattern: &template::Expression) -> Result<HashSet<String>> {
    let allocator = Allocator::default();
    let source = format!("({}) => 0", pattern.code);
    let code: &str = allocator.alloc_str(&source);
    let expr = Parser::new(&allocator, code, source_type())
        .parse_expression()
        .map_err(|_| {
            CompileError::analysis(
                format!("Invalid binding pattern `{}`.", pattern.code),
                pattern.span,
            )
        })?;
    let mut names = HashSet::new();
    if let Expression::ArrowFunctionExpression(arrow) = &expr {
        for param in &arrow.params.items {
            collect_pattern_names(&param.pattern, &mut names);
        }
    }
    Ok(names)
}

/// Rewrite a parsed script in place.
pub fn transform_program<'a>(
    allocator: &'a Allocator,
    program: &mut Program<'a>,
    reactive: &HashSet<String>,
) -> Result<BTreeSet<String>> {
    let mut transform = ReactiveTransform::new(allocator, reactive, TransformMode::Script);
    transform.visit_program(program);
    transform.finish()
}

// ═══════════════════════════════════════════════════════════════════════════════
// WHOLE SCRIPTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse a script or module body. `span` is where the code sits in its file
/// and is reported when the first syntax error carries no usable label.
pub fn parse_program<'a>(
    allocator: &'a Allocator,
    code: &str,
    source_type: SourceType,
    span: Span,
) -> Result<Program<'a>> {
    let code: &'a str = allocator.alloc_str(code);
    let ret = Parser::new(allocator, code, source_type).parse();
    if let Some(error) = ret.errors.first() {
        return Err(CompileError::analysis(format!("Invalid script: {}", error), span));
    }
    Ok(ret.program)
}

/// Strip TypeScript syntax in place. Imports are kept even when they look
/// unused, since template code references them by name.
pub fn strip_typescript<'a>(allocator: &'a Allocator, program: &mut Program<'a>, path: &Path) -> Result<()> {
    let scoping = SemanticBuilder::new().build(program).semantic.into_scoping();
    let mut options = TransformOptions::default();
    options.typescript.only_remove_type_imports = true;
    let ret = Transformer::new(allocator, path, &options).build_with_scoping(scoping, program);
    if let Some(error) = ret.errors.first() {
        return Err(CompileError::analysis(
            format!("Could not strip TypeScript from {}: {}", path.display(), error),
            None,
        ));
    }
    log::trace!("stripped TypeScript from {}", path.display());
    Ok(())
}
