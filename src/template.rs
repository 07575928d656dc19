//! Template tree produced by the markup front end.
//!
//! The tree is immutable input to lowering. Embedded JavaScript is kept as
//! source text plus its span and is parsed with oxc whenever a pass needs it,
//! so every rewrite starts from a fresh tree.

use serde::{Deserialize, Serialize};
use std::ops::Range;

// ═══════════════════════════════════════════════════════════════════════════════
// SPANS
// ═══════════════════════════════════════════════════════════════════════════════

/// Byte offsets into the original source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn range(&self) -> Range<usize> {
        self.start as usize..self.end as usize
    }
}

impl From<oxc_span::Span> for Span {
    fn from(span: oxc_span::Span) -> Self {
        Self::new(span.start, span.end)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPONENT ROOT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptLang {
    #[default]
    Js,
    Ts,
}

/// The instance `<script>` block of a component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    pub content: String,
    /// Offset of `content` inside the component file.
    pub content_start: u32,
    pub lang: ScriptLang,
    pub span: Span,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Root {
    pub instance: Option<Script>,
    pub fragment: Vec<Node>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODES
// ═══════════════════════════════════════════════════════════════════════════════

/// An embedded JavaScript expression or binding pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub code: String,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Node {
    Element(Element),
    InlineComponent(Element),
    Text(Text),
    MustacheTag(MustacheTag),
    IfBlock(IfBlock),
    EachBlock(EachBlock),
    RenderTag(RenderTag),
    Fragment(Fragment),
    Comment(Comment),
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Element(el) | Node::InlineComponent(el) => el.span,
            Node::Text(text) => text.span,
            Node::MustacheTag(tag) => tag.span,
            Node::IfBlock(block) => block.span,
            Node::EachBlock(block) => block.span,
            Node::RenderTag(tag) => tag.span,
            Node::Fragment(fragment) => fragment.span,
            Node::Comment(comment) => comment.span,
        }
    }

    /// Whitespace-only text and comments contribute nothing to the widget tree.
    pub fn is_insignificant(&self) -> bool {
        match self {
            Node::Text(text) => text.data.trim().is_empty(),
            Node::Comment(_) => true,
            _ => false,
        }
    }

    /// Text and interpolations form label content.
    pub fn is_text_like(&self) -> bool {
        matches!(self, Node::Text(_) | Node::MustacheTag(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Text {
    pub data: String,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MustacheTag {
    pub expression: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IfBlock {
    pub test: Expression,
    pub consequent: Vec<Node>,
    pub alternate: Option<Vec<Node>>,
    /// Set on the nested block produced by `{:else if ...}`.
    pub elseif: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EachBlock {
    pub expression: Expression,
    /// Item binder; an identifier or a destructuring pattern.
    pub context: Expression,
    pub index: Option<String>,
    pub key: Option<Expression>,
    pub body: Vec<Node>,
    pub fallback: Option<Vec<Node>>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderTag {
    pub expression: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    pub children: Vec<Node>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub data: String,
    pub span: Span,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ATTRIBUTES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribute {
    /// Full attribute name including any directive prefix (`bind:value`, `on:click`).
    pub name: String,
    pub value: AttributeValue,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum AttributeValue {
    /// Bare attribute with no value, `<entry editable>`.
    Boolean,
    Text(String),
    Expression(Expression),
    /// Mixed literal text and interpolations, `label="Hi {name}"`.
    Concat(Vec<AttributePart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum AttributePart {
    Text(String),
    Expression(Expression),
}

impl Attribute {
    /// Splits `bind:value` into `("bind", Some("value"))` and `label` into `("label", None)`.
    pub fn directive(&self) -> (&str, Option<&str>) {
        match self.name.split_once(':') {
            Some((prefix, rest)) => (prefix, Some(rest)),
            None => (self.name.as_str(), None),
        }
    }
}
