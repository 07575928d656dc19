//! Control-flow blocks: `{#if}`, `{#each}` and `{@render}`.
//!
//! Each block owns one container widget, created once. A single effect clears
//! the container and repopulates it by calling hoisted renderer functions,
//! so the container keeps its identity across updates.

use std::collections::HashSet;

use crate::error::Result;
use crate::lower::{attach, indent_block, rewrite, walk_nodes, Lowered};
use crate::state::CompilerState;
use crate::template::{EachBlock, IfBlock, Node, RenderTag, Span};
use crate::transform::pattern_binding_names;
use crate::widgets::Arity;

/// Remove every child. `child` is scoped to the loop so user names stay visible.
fn clear_container(container: &str) -> String {
    format!(
        "for (let child = {c}.get_first_child(); child != null; child = {c}.get_first_child()) {{ {c}.remove(child); }}\n",
        c = container
    )
}

/// Hoist `function prefix_N(render_parent_M, ...params) { ... }` into `out.helpers`.
///
/// The parent parameter gets a generated name so it cannot hide a script
/// variable or an outer binder that happens to be called `parent`.
fn renderer(
    out: &mut Lowered,
    state: &mut CompilerState,
    prefix: &str,
    nodes: &[Node],
    params: &[&str],
    scope: &HashSet<String>,
) -> Result<String> {
    let name = state.next_name(prefix);
    let parent = state.next_name("render_parent");
    let body = walk_nodes(nodes, &parent, Arity::Multiple, state, scope)?.into_body();
    let params = std::iter::once(parent.as_str())
        .chain(params.iter().copied())
        .collect::<Vec<_>>()
        .join(", ");
    out.helpers += &format!(
        "function {}({}) {{\n{}\n}}\n\n",
        name,
        params,
        indent_block(&body)
    );
    Ok(name)
}

fn container(
    out: &mut Lowered,
    state: &mut CompilerState,
    prefix: &str,
    constructor: &str,
    parent: &str,
    parent_arity: Arity,
    span: Span,
) -> Result<String> {
    let name = state.next_name(prefix);
    out.declarations += &format!("const {} = {};\n", name, constructor);
    out.declarations += &attach(parent, parent_arity, &name, span)?;
    Ok(name)
}

/// Parenthesize code placed before `??` unless it is a plain reference or call chain.
fn nullish_operand(code: &str) -> String {
    let simple = code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "_$.()[]'\"".contains(c));
    if simple {
        code.to_string()
    } else {
        format!("({})", code)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// IF
// ═══════════════════════════════════════════════════════════════════════════════

/// Follow `{:else if}` links so the chain is emitted flat.
fn if_arms(block: &IfBlock) -> Vec<(Option<&crate::template::Expression>, &[Node])> {
    let mut arms = Vec::new();
    let mut current = block;
    loop {
        arms.push((Some(&current.test), current.consequent.as_slice()));
        let Some(alternate) = &current.alternate else {
            break;
        };
        let significant: Vec<&Node> = alternate.iter().filter(|n| !n.is_insignificant()).collect();
        match significant.as_slice() {
            [Node::IfBlock(nested)] if nested.elseif => current = nested,
            _ => {
                arms.push((None, alternate.as_slice()));
                break;
            }
        }
    }
    arms
}

pub fn lower_if(
    block: &IfBlock,
    parent: &str,
    parent_arity: Arity,
    state: &mut CompilerState,
    local_scope: &HashSet<String>,
) -> Result<Lowered> {
    let mut out = Lowered::default();
    let target = container(
        &mut out,
        state,
        "if_container",
        "new Gtk.Box()",
        parent,
        parent_arity,
        block.span,
    )?;

    let mut chain = String::new();
    for (index, (test, nodes)) in if_arms(block).into_iter().enumerate() {
        let name = renderer(&mut out, state, "if_renderer", nodes, &[], local_scope)?;
        let call = format!("    {}({});\n}}", name, target);
        match test {
            Some(test) => {
                let condition = rewrite(state, test, local_scope)?;
                let keyword = if index == 0 { "if" } else { " else if" };
                chain += &format!("{} ({}) {{\n{}", keyword, condition.code, call);
            }
            None => chain += &format!(" else {{\n{}", call),
        }
    }

    out.handlers += &format!(
        "$effect(() => {{\n{}\n{}\n}});\n",
        indent_block(&clear_container(&target)),
        indent_block(&chain)
    );
    Ok(out)
}

// ═══════════════════════════════════════════════════════════════════════════════
// EACH
// ═══════════════════════════════════════════════════════════════════════════════

pub fn lower_each(
    block: &EachBlock,
    parent: &str,
    parent_arity: Arity,
    state: &mut CompilerState,
    local_scope: &HashSet<String>,
) -> Result<Lowered> {
    let mut out = Lowered::default();
    let target = container(
        &mut out,
        state,
        "each_container",
        "new Gtk.Box({ orientation: Gtk.Orientation.VERTICAL })",
        parent,
        parent_arity,
        block.span,
    )?;
    let items_var = state.next_name("each_items");

    let mut item_scope = local_scope.clone();
    item_scope.extend(pattern_binding_names(&block.context)?);
    if let Some(index) = &block.index {
        item_scope.insert(index.clone());
    }
    if let Some(key) = &block.key {
        // Validated only; items are always re-rendered.
        rewrite(state, key, &item_scope)?;
    }

    let mut params = vec![block.context.code.as_str()];
    if let Some(index) = &block.index {
        params.push(index.as_str());
    }
    let item_renderer = renderer(&mut out, state, "each_renderer", &block.body, &params, &item_scope)?;
    let items = rewrite(state, &block.expression, local_scope)?;
    let index = block.index.as_deref().unwrap_or("i");

    let lp = format!(
        "for (let {i} = 0; {i} < {items}.length; {i}++) {{\n    {r}({c}, {items}[{i}], {i});\n}}\n",
        i = index,
        items = items_var,
        r = item_renderer,
        c = target
    );
    let population = match &block.fallback {
        Some(fallback) => {
            let empty_renderer =
                renderer(&mut out, state, "each_else_renderer", fallback, &[], local_scope)?;
            format!(
                "if ({}.length === 0) {{\n    {}({});\n}} else {{\n{}\n}}\n",
                items_var,
                empty_renderer,
                target,
                indent_block(&lp)
            )
        }
        None => lp,
    };

    out.handlers += &format!(
        "$effect(() => {{\n    const {} = {} ?? [];\n{}\n{}\n}});\n",
        items_var,
        nullish_operand(&items.code),
        indent_block(&clear_container(&target)),
        indent_block(&population)
    );
    Ok(out)
}

// ═══════════════════════════════════════════════════════════════════════════════
// RENDER
// ═══════════════════════════════════════════════════════════════════════════════

pub fn lower_render(
    tag: &RenderTag,
    parent: &str,
    parent_arity: Arity,
    state: &mut CompilerState,
    local_scope: &HashSet<String>,
) -> Result<Lowered> {
    let mut out = Lowered::default();
    let target = container(
        &mut out,
        state,
        "render_container",
        "new Gtk.Box()",
        parent,
        parent_arity,
        tag.span,
    )?;
    let rendered = state.next_name("rendered_item");
    let expression = rewrite(state, &tag.expression, local_scope)?;

    out.handlers += &format!(
        "$effect(() => {{\n    const {r} = {expr};\n{clear}\n    if ({r}) {{\n        if ({r}.rootWidget) {{\n            {c}.append({r}.rootWidget);\n        }} else {{\n            {c}.append({r});\n        }}\n    }}\n}});\n",
        r = rendered,
        expr = expression.code,
        clear = indent_block(&clear_container(&target)),
        c = target
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nullish_operand() {
        assert_eq!(nullish_operand("$get(items)"), "$get(items)");
        assert_eq!(nullish_operand("a || b"), "(a || b)");
        assert_eq!(nullish_operand("ok ? list : []"), "(ok ? list : [])");
    }

    #[test]
    fn test_clear_loop_shape() {
        let code = clear_container("if_container_0");
        assert!(code.starts_with("for (let child = if_container_0.get_first_child();"));
        assert!(code.contains("if_container_0.remove(child)"));
    }
}
