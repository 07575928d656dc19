//! Lexical scope tracking for the reactive rewrite.
//!
//! Reactivity is a flat set of names; shadowing is decided here. A name bound
//! in any frame of the chain suppresses rewriting, whatever its reactivity.

use oxc_ast::ast::{
    BindingPattern, Class, Function, Statement, VariableDeclaration, VariableDeclarationKind,
};
use oxc_ast_visit::{walk, Visit};
use oxc_syntax::scope::ScopeFlags;
use std::collections::HashSet;

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPE CHAIN
// ═══════════════════════════════════════════════════════════════════════════════

/// Ordered stack of name sets, searched innermost to outermost.
#[derive(Debug, Clone, Default)]
pub struct ScopeChain {
    frames: Vec<HashSet<String>>,
}

impl ScopeChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// A chain whose outermost frame holds caller-supplied locals, e.g. the
    /// binders of enclosing template blocks.
    pub fn with_base(base: &HashSet<String>) -> Self {
        Self {
            frames: vec![base.clone()],
        }
    }

    pub fn push(&mut self, frame: HashSet<String>) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn contains(&self, name: &str) -> bool {
        self.frames.iter().rev().any(|frame| frame.contains(name))
    }

}

// ═══════════════════════════════════════════════════════════════════════════════
// BINDING COLLECTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Every name bound by a pattern, including nested destructuring, defaults and rest elements.
pub fn collect_pattern_names(pattern: &BindingPattern, out: &mut HashSet<String>) {
    match pattern {
        BindingPattern::BindingIdentifier(id) => {
            out.insert(id.name.to_string());
        }
        BindingPattern::ObjectPattern(obj) => {
            for prop in &obj.properties {
                collect_pattern_names(&prop.value, out);
            }
            if let Some(rest) = &obj.rest {
                collect_pattern_names(&rest.argument, out);
            }
        }
        BindingPattern::ArrayPattern(arr) => {
            for elem in arr.elements.iter().flatten() {
                collect_pattern_names(elem, out);
            }
            if let Some(rest) = &arr.rest {
                collect_pattern_names(&rest.argument, out);
            }
        }
        BindingPattern::AssignmentPattern(assign) => {
            collect_pattern_names(&assign.left, out);
        }
    }
}

/// The identifier a parameter binds when it is a plain name (optionally with a default).
pub fn simple_pattern_name<'p>(pattern: &'p BindingPattern) -> Option<&'p str> {
    match pattern {
        BindingPattern::BindingIdentifier(id) => Some(id.name.as_str()),
        BindingPattern::AssignmentPattern(assign) => simple_pattern_name(&assign.left),
        _ => None,
    }
}

/// Names declared directly in a statement list by `let`/`const`/`var`,
/// function declarations and class declarations.
pub fn lexical_names(statements: &[Statement]) -> HashSet<String> {
    let mut names = HashSet::new();
    for stmt in statements {
        match stmt {
            Statement::VariableDeclaration(decl) => {
                for declarator in &decl.declarations {
                    collect_pattern_names(&declarator.id, &mut names);
                }
            }
            Statement::FunctionDeclaration(func) => {
                if let Some(id) = &func.id {
                    names.insert(id.name.to_string());
                }
            }
            Statement::ClassDeclaration(class) => {
                if let Some(id) = &class.id {
                    names.insert(id.name.to_string());
                }
            }
            _ => {}
        }
    }
    names
}

/// `var` declarations anywhere in a function body, without entering nested functions.
pub fn hoisted_var_names(statements: &[Statement]) -> HashSet<String> {
    let mut collector = VarCollector {
        names: HashSet::new(),
    };
    for stmt in statements {
        collector.visit_statement(stmt);
    }
    collector.names
}

struct VarCollector {
    names: HashSet<String>,
}

impl<'a> Visit<'a> for VarCollector {
    fn visit_variable_declaration(&mut self, decl: &VariableDeclaration<'a>) {
        if decl.kind == VariableDeclarationKind::Var {
            for declarator in &decl.declarations {
                collect_pattern_names(&declarator.id, &mut self.names);
            }
        }
        walk::walk_variable_declaration(self, decl);
    }

    fn visit_function(&mut self, _func: &Function<'a>, _flags: ScopeFlags) {}

    fn visit_arrow_function_expression(
        &mut self,
        _arrow: &oxc_ast::ast::ArrowFunctionExpression<'a>,
    ) {
    }

    fn visit_class(&mut self, _class: &Class<'a>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxc_allocator::Allocator;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    #[test]
    fn test_chain_searches_all_frames() {
        let mut chain = ScopeChain::new();
        chain.push(HashSet::from(["item".to_string()]));
        chain.push(HashSet::from(["x".to_string()]));
        assert!(chain.contains("item"));
        assert!(chain.contains("x"));
        chain.pop();
        assert!(!chain.contains("x"));
        assert!(chain.contains("item"));
    }

    #[test]
    fn test_hoisted_vars_skip_nested_functions() {
        let allocator = Allocator::default();
        let code = "if (a) { var x = 1; } function inner() { var y = 2; } let z = () => { var w; };";
        let ret = Parser::new(&allocator, code, SourceType::mjs()).parse();
        let names = hoisted_var_names(&ret.program.body);
        assert!(names.contains("x"));
        assert!(!names.contains("y"));
        assert!(!names.contains("w"));
    }

    #[test]
    fn test_lexical_names_include_patterns() {
        let allocator = Allocator::default();
        let code = "const { a, b: [c, ...d] } = o; function f() {} class K {}";
        let ret = Parser::new(&allocator, code, SourceType::mjs()).parse();
        let names = lexical_names(&ret.program.body);
        for name in ["a", "c", "d", "f", "K"] {
            assert!(names.contains(name), "missing {}", name);
        }
        assert!(!names.contains("b"));
    }
}
