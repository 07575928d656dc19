//! Template lowering.
//!
//! Walks the template tree and emits the statements that build the GTK widget
//! tree: one constructor per element, attachment to the parent according to
//! the parent's arity, property effects, signal handlers and two-way bindings.
//! Control-flow blocks live in `blocks.rs`.

use std::collections::HashSet;

use crate::blocks;
use crate::error::{CompileError, Result};
use crate::state::CompilerState;
use crate::template::{
    Attribute, AttributePart, AttributeValue, Element, Expression, Node, Span,
};
use crate::transform::{transform_expression, ExpressionShape, RewrittenExpression};
use crate::widgets::{self, Arity, WidgetDescriptor};

/// Code produced for a run of sibling nodes.
///
/// `helpers` holds hoisted renderer and snippet functions. They are emitted
/// in the function that encloses the lowered nodes, so block binders such as
/// an each item stay visible to nested renderers.
#[derive(Debug, Default, Clone)]
pub struct Lowered {
    pub helpers: String,
    pub declarations: String,
    pub handlers: String,
}

impl Lowered {
    pub fn extend(&mut self, other: Lowered) {
        self.helpers.push_str(&other.helpers);
        self.declarations.push_str(&other.declarations);
        self.handlers.push_str(&other.handlers);
    }

    /// Everything, in emission order, as one function body.
    pub fn into_body(self) -> String {
        let mut body = self.helpers;
        body.push_str(&self.declarations);
        body.push_str(&self.handlers);
        body
    }
}

pub const ROOT_BOX: &str = "new Gtk.Box({ orientation: Gtk.Orientation.VERTICAL, margin_top: 12, margin_bottom: 12, margin_start: 12, margin_end: 12, spacing: 6 })";

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY POINTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Lower a component's top-level fragment into the state's output buffers.
pub fn lower_fragment(nodes: &[Node], state: &mut CompilerState) -> Result<()> {
    let root = state.next_name("box");
    state.widget_declarations += &format!("const {} = {};\n", root, ROOT_BOX);
    state.root_widget = root.clone();

    let lowered = walk_nodes(nodes, &root, Arity::Multiple, state, &HashSet::new())?;
    state.helper_functions += &lowered.helpers;
    state.widget_declarations += &lowered.declarations;
    state.effects_and_handlers += &lowered.handlers;
    Ok(())
}

/// Lower sibling nodes attached to `parent`.
pub fn walk_nodes(
    nodes: &[Node],
    parent: &str,
    parent_arity: Arity,
    state: &mut CompilerState,
    local_scope: &HashSet<String>,
) -> Result<Lowered> {
    let mut out = Lowered::default();
    let mut text_run: Vec<&Node> = Vec::new();

    for node in flatten_fragments(nodes) {
        if node.is_text_like() {
            text_run.push(node);
            continue;
        }
        out.extend(lower_text_run(&text_run, parent, parent_arity, state, local_scope)?);
        text_run.clear();

        let lowered = match node {
            Node::Element(el) => lower_element(el, parent, parent_arity, state, local_scope)?,
            Node::InlineComponent(el) => {
                lower_component(el, parent, parent_arity, state, local_scope)?
            }
            Node::IfBlock(block) => blocks::lower_if(block, parent, parent_arity, state, local_scope)?,
            Node::EachBlock(block) => {
                blocks::lower_each(block, parent, parent_arity, state, local_scope)?
            }
            Node::RenderTag(tag) => blocks::lower_render(tag, parent, parent_arity, state, local_scope)?,
            Node::Comment(_) => continue,
            Node::Text(_) | Node::MustacheTag(_) | Node::Fragment(_) => continue,
        };
        out.extend(lowered);
    }
    out.extend(lower_text_run(&text_run, parent, parent_arity, state, local_scope)?);
    Ok(out)
}

/// Fragments lower their children in place.
fn flatten_fragments(nodes: &[Node]) -> Vec<&Node> {
    let mut flat = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            Node::Fragment(fragment) => flat.extend(flatten_fragments(&fragment.children)),
            Node::Comment(_) => {}
            other => flat.push(other),
        }
    }
    flat
}

/// Loose text between widgets of a container becomes its own label.
fn lower_text_run(
    run: &[&Node],
    parent: &str,
    parent_arity: Arity,
    state: &mut CompilerState,
    local_scope: &HashSet<String>,
) -> Result<Lowered> {
    let mut out = Lowered::default();
    let text = text_template(run, state, local_scope)?;
    if text.content.is_empty() {
        return Ok(out);
    }
    let label = state.next_name("label");
    out.declarations += &format!("const {} = new Gtk.Label();\n", label);
    let span = match (run.first(), run.last()) {
        (Some(first), Some(last)) => Span::new(first.span().start, last.span().end),
        _ => Span::default(),
    };
    out.declarations += &attach(parent, parent_arity, &label, span)?;
    apply_text(&mut out, &label, "set_label", &text);
    Ok(out)
}

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Attachment statement for a child of a parent with the given arity.
/// A parent that takes no children is a Lowering error at `span`.
pub fn attach(parent: &str, parent_arity: Arity, child: &str, span: Span) -> Result<String> {
    match parent_arity {
        Arity::Single => Ok(format!("{}.set_child({});\n", parent, child)),
        Arity::Multiple => Ok(format!("{}.append({});\n", parent, child)),
        Arity::None => Err(CompileError::lowering(
            format!("'{}' cannot contain child widgets.", parent),
            span,
        )),
    }
}

/// Indent every non-empty line by four spaces.
pub fn indent_block(code: &str) -> String {
    code.lines()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                format!("    {}", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `{ a: 1, b: 2 }`, or `{}` when empty.
pub fn object_literal(entries: &[String]) -> String {
    if entries.is_empty() {
        "{}".to_string()
    } else {
        format!("{{ {} }}", entries.join(", "))
    }
}

/// Property key, quoted when it is not a plain identifier.
pub fn object_key(name: &str) -> String {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if valid {
        name.to_string()
    } else {
        serde_json::to_string(name).unwrap_or_else(|_| format!("'{}'", name))
    }
}

/// Lowercased, identifier-safe prefix for an instance variable.
fn instance_prefix(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

fn escape_template_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('`', "\\`")
        .replace("${", "\\${")
}

pub(crate) fn rewrite(
    state: &CompilerState,
    expression: &Expression,
    local_scope: &HashSet<String>,
) -> Result<RewrittenExpression> {
    transform_expression(expression, &state.reactive, local_scope)
}

/// Span of `<tag ...` up to the first attribute or child.
fn opening_tag_span(el: &Element) -> Span {
    let end = el
        .attributes
        .first()
        .map(|a| a.span.start)
        .or_else(|| el.children.first().map(|c| c.span().start))
        .unwrap_or(el.span.end);
    let end = if end > el.span.start { end } else { el.span.end };
    Span::new(el.span.start, end)
}

fn value_span(attr: &Attribute) -> Span {
    match &attr.value {
        AttributeValue::Expression(expr) => expr.span,
        _ => attr.span,
    }
}

/// A template literal assembled from text and interpolations.
struct TextTemplate {
    /// Literal body without the enclosing backticks, trimmed.
    content: String,
    reactive: bool,
}

impl TextTemplate {
    fn literal(&self) -> String {
        format!("`{}`", self.content)
    }
}

fn text_template(
    nodes: &[&Node],
    state: &CompilerState,
    local_scope: &HashSet<String>,
) -> Result<TextTemplate> {
    let mut content = String::new();
    let mut reactive = false;
    for node in nodes {
        match node {
            Node::Text(text) => content.push_str(&escape_template_text(&text.data)),
            Node::MustacheTag(tag) => {
                let rewritten = rewrite(state, &tag.expression, local_scope)?;
                reactive |= rewritten.is_reactive();
                content.push_str(&format!("${{{}}}", rewritten.code));
            }
            _ => {}
        }
    }
    Ok(TextTemplate {
        content: content.trim().to_string(),
        reactive,
    })
}

fn concat_template(
    parts: &[AttributePart],
    state: &CompilerState,
    local_scope: &HashSet<String>,
) -> Result<TextTemplate> {
    let mut content = String::new();
    let mut reactive = false;
    for part in parts {
        match part {
            AttributePart::Text(text) => content.push_str(&escape_template_text(text)),
            AttributePart::Expression(expr) => {
                let rewritten = rewrite(state, expr, local_scope)?;
                reactive |= rewritten.is_reactive();
                content.push_str(&format!("${{{}}}", rewritten.code));
            }
        }
    }
    Ok(TextTemplate { content, reactive })
}

fn apply_text(out: &mut Lowered, widget: &str, setter: &str, text: &TextTemplate) {
    if text.reactive {
        out.handlers += &format!(
            "$effect(() => {{ {}.{}({}); }});\n",
            widget,
            setter,
            text.literal()
        );
    } else {
        out.declarations += &format!("{}.{}({});\n", widget, setter, text.literal());
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ELEMENTS
// ═══════════════════════════════════════════════════════════════════════════════

enum AttributeRole<'e> {
    Event(&'e str),
    Bind(Option<&'e str>),
    Property,
}

fn attribute_role(attr: &Attribute) -> AttributeRole<'_> {
    match attr.directive() {
        ("on", Some(event)) => AttributeRole::Event(event),
        ("bind", property) => AttributeRole::Bind(property),
        (name, None) if name.len() > 2 && name.starts_with("on") => AttributeRole::Event(&name[2..]),
        _ => AttributeRole::Property,
    }
}

fn signal_name(event: &str) -> &str {
    match event {
        "click" => "clicked",
        "toggle" => "toggled",
        other => other,
    }
}

pub fn lower_element(
    el: &Element,
    parent: &str,
    parent_arity: Arity,
    state: &mut CompilerState,
    local_scope: &HashSet<String>,
) -> Result<Lowered> {
    let descriptor = widgets::resolve(&el.name, opening_tag_span(el))?;
    let var = state.next_name(&el.name);
    let mut out = Lowered::default();
    let mut props = Vec::new();
    let mut bindings = String::new();
    let mut events = Vec::new();

    for attr in &el.attributes {
        match attribute_role(attr) {
            AttributeRole::Event(event) => events.push((event, attr)),
            AttributeRole::Bind(property) => {
                bindings += &lower_bind(descriptor, &var, attr, property, state, local_scope)?;
            }
            AttributeRole::Property => {
                lower_property(descriptor, &var, attr, state, local_scope, &mut props, &mut out)?;
            }
        }
    }

    let constructor = if props.is_empty() {
        format!("new {}()", descriptor.class)
    } else {
        format!("new {}({})", descriptor.class, object_literal(&props))
    };
    out.declarations = format!("const {} = {};\n{}", var, constructor, out.declarations);
    out.declarations += &attach(parent, parent_arity, &var, opening_tag_span(el))?;

    let children = lower_element_children(el, descriptor, &var, state, local_scope)?;
    out.extend(children);
    out.handlers += &bindings;

    for (event, attr) in events {
        out.handlers += &lower_event(&var, event, attr, state, local_scope)?;
    }
    Ok(out)
}

fn lower_property(
    descriptor: &WidgetDescriptor,
    var: &str,
    attr: &Attribute,
    state: &CompilerState,
    local_scope: &HashSet<String>,
    props: &mut Vec<String>,
    out: &mut Lowered,
) -> Result<()> {
    let name = widgets::normalize_attribute_name(&attr.name);
    if name == "bind" || !descriptor.accepts(&name) {
        return Err(descriptor.unsupported_attribute(&attr.name, attr.span));
    }
    let transformer = descriptor.transformer(&name);

    let (code, reactive) = match &attr.value {
        AttributeValue::Boolean => match transformer {
            Some(t) => (t.transform_literal("", attr.span)?, false),
            None => ("true".to_string(), false),
        },
        AttributeValue::Text(text) => match transformer {
            Some(t) => (t.transform_literal(text, attr.span)?, false),
            None => (widgets::literal_value(&name, text), false),
        },
        AttributeValue::Expression(expr) => {
            let rewritten = rewrite(state, expr, local_scope)?;
            let code = match transformer {
                Some(t) => t.wrap_dynamic(&rewritten.code),
                None => rewritten.code.clone(),
            };
            (code, rewritten.is_reactive())
        }
        AttributeValue::Concat(parts) => {
            let template = concat_template(parts, state, local_scope)?;
            let code = match transformer {
                Some(t) => t.wrap_dynamic(&template.literal()),
                None => template.literal(),
            };
            (code, template.reactive)
        }
    };

    if reactive {
        out.handlers += &format!("$effect(() => {{ {}.{} = {}; }});\n", var, name, code);
    } else {
        props.push(format!("{}: {}", name, code));
    }
    Ok(())
}

fn lower_element_children(
    el: &Element,
    descriptor: &WidgetDescriptor,
    var: &str,
    state: &mut CompilerState,
    local_scope: &HashSet<String>,
) -> Result<Lowered> {
    let children = flatten_fragments(&el.children);
    let widget_children: Vec<&Node> = children
        .iter()
        .copied()
        .filter(|c| !c.is_text_like())
        .collect();
    let text_children: Vec<&Node> = children
        .iter()
        .copied()
        .filter(|c| c.is_text_like())
        .collect();
    let has_text = text_children.iter().any(|c| !c.is_insignificant());
    let mut out = Lowered::default();

    match descriptor.arity {
        Arity::Single => {
            if !widget_children.is_empty() && has_text {
                return Err(CompileError::lowering(
                    format!(
                        "<{}> cannot have both element children and direct text content.",
                        el.name
                    ),
                    opening_tag_span(el),
                ));
            }
            if widget_children.len() > 1 {
                return Err(CompileError::lowering(
                    format!("<{}> can only have one element child.", el.name),
                    opening_tag_span(el),
                ));
            }
            if !widget_children.is_empty() {
                out.extend(walk_nodes(&el.children, var, Arity::Single, state, local_scope)?);
            } else if has_text {
                let text = text_template(&text_children, state, local_scope)?;
                let label = state.next_name("label");
                out.declarations += &format!("const {} = new Gtk.Label();\n", label);
                apply_text(&mut out, &label, "set_label", &text);
                out.declarations += &attach(var, Arity::Single, &label, opening_tag_span(el))?;
            }
        }
        Arity::Multiple => {
            out.extend(walk_nodes(&el.children, var, Arity::Multiple, state, local_scope)?);
        }
        Arity::None => {
            if let Some(child) = widget_children.first() {
                return Err(CompileError::lowering(
                    format!("<{}> cannot have element children.", el.name),
                    child.span(),
                ));
            }
            if !has_text {
                return Ok(out);
            }
            let Some(setter) = descriptor.text_setter else {
                return Err(CompileError::lowering(
                    format!("<{}> cannot have text content.", el.name),
                    opening_tag_span(el),
                ));
            };
            let text = text_template(&text_children, state, local_scope)?;
            if !text.content.is_empty() {
                apply_text(&mut out, var, setter, &text);
            }
        }
    }
    Ok(out)
}

fn lower_event(
    var: &str,
    event: &str,
    attr: &Attribute,
    state: &CompilerState,
    local_scope: &HashSet<String>,
) -> Result<String> {
    let AttributeValue::Expression(expr) = &attr.value else {
        return Err(CompileError::lowering(
            format!("Event handler for '{}' must be an expression.", event),
            attr.span,
        ));
    };
    let rewritten = rewrite(state, expr, local_scope)?;
    let handler = match rewritten.shape {
        ExpressionShape::Identifier(_) | ExpressionShape::Function => rewritten.code,
        ExpressionShape::Other => format!("() => {{ {}; }}", rewritten.code),
    };
    log::trace!("connect {} -> {}", event, signal_name(event));
    Ok(format!("{}.connect('{}', {});\n", var, signal_name(event), handler))
}

/// The reactive identifier a `bind` directive targets.
fn bind_target(
    attr: &Attribute,
    state: &CompilerState,
    local_scope: &HashSet<String>,
) -> Result<String> {
    let invalid = || {
        CompileError::lowering(
            "Expected a single state variable identifier in a bind expression.",
            value_span(attr),
        )
    };
    let AttributeValue::Expression(expr) = &attr.value else {
        return Err(invalid());
    };
    let rewritten = rewrite(state, expr, local_scope)?;
    match rewritten.shape {
        ExpressionShape::Identifier(name) if rewritten.reads.contains(&name) => Ok(name),
        _ => Err(invalid()),
    }
}

fn lower_bind(
    descriptor: &WidgetDescriptor,
    var: &str,
    attr: &Attribute,
    property: Option<&str>,
    state: &CompilerState,
    local_scope: &HashSet<String>,
) -> Result<String> {
    let property = match property {
        Some(p) => {
            let p = widgets::normalize_attribute_name(p);
            if p == "bind" || !descriptor.accepts(&p) {
                return Err(descriptor.unsupported_attribute(&attr.name, attr.span));
            }
            p
        }
        None => match descriptor.bind_property {
            Some(p) if descriptor.accepts("bind") => p.to_string(),
            _ => return Err(descriptor.unsupported_attribute(&attr.name, attr.span)),
        },
    };
    let cell = bind_target(attr, state, local_scope)?;
    let signal = property.replace('_', "-");

    Ok(format!(
        "$effect(() => {{ if ({var}.get_{p}() !== $get({cell})) {{ {var}.set_{p}($get({cell})); }} }});\n\
         {var}.connect('notify::{signal}', () => {{ if ({var}.get_{p}() !== $get({cell})) {{ $set({cell}, {var}.get_{p}()); }} }});\n",
        var = var,
        p = property,
        cell = cell,
        signal = signal,
    ))
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPONENTS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn lower_component(
    el: &Element,
    parent: &str,
    parent_arity: Arity,
    state: &mut CompilerState,
    local_scope: &HashSet<String>,
) -> Result<Lowered> {
    let instance = state.next_name(&instance_prefix(&el.name));
    let mut out = Lowered::default();
    let mut props = Vec::new();

    for attr in &el.attributes {
        match attr.directive() {
            ("bind", Some(prop)) => {
                let cell = bind_target(attr, state, local_scope)?;
                props.push(format!("{}: {}", object_key(prop), cell));
                continue;
            }
            ("on", Some(event)) => {
                return Err(CompileError::lowering(
                    format!(
                        "Components take callback props; use on{}={{...}} instead of on:{}.",
                        event, event
                    ),
                    attr.span,
                ));
            }
            _ => {}
        }

        let key = object_key(&attr.name);
        let value = match &attr.value {
            AttributeValue::Boolean => "$state(true)".to_string(),
            AttributeValue::Text(text) => format!(
                "$state({})",
                serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
            ),
            AttributeValue::Expression(expr) => {
                let rewritten = rewrite(state, expr, local_scope)?;
                match &rewritten.shape {
                    ExpressionShape::Identifier(name) if rewritten.reads.contains(name) => {
                        name.clone()
                    }
                    _ if rewritten.is_reactive() => format!("$derived(() => {})", rewritten.code),
                    _ => rewritten.code,
                }
            }
            AttributeValue::Concat(parts) => {
                let template = concat_template(parts, state, local_scope)?;
                if template.reactive {
                    format!("$derived(() => {})", template.literal())
                } else {
                    format!("$state({})", template.literal())
                }
            }
        };
        props.push(format!("{}: {}", key, value));
    }

    if el.children.iter().any(|c| !c.is_insignificant()) {
        let children_box = state.next_name("children_box");
        let children = walk_nodes(&el.children, &children_box, Arity::Multiple, state, local_scope)?;
        let snippet = state.next_name("children_snippet");
        let body = format!(
            "const {} = new Gtk.Box({{ orientation: Gtk.Orientation.HORIZONTAL }});\n{}return {};",
            children_box,
            children.into_body(),
            children_box
        );
        out.helpers += &format!("function {}() {{\n{}\n}}\n\n", snippet, indent_block(&body));
        props.push(format!("children: {}", snippet));
    }

    out.declarations += &format!(
        "const {} = {}({});\n",
        instance,
        el.name,
        object_literal(&props)
    );
    out.declarations += &attach(
        parent,
        parent_arity,
        &format!("{}.rootWidget", instance),
        opening_tag_span(el),
    )?;
    Ok(out)
}
