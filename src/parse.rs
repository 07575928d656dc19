//! Markup front end.
//!
//! A small recursive-descent parser for the component syntax the compiler
//! supports: elements and components, text, `{expr}` interpolation, the
//! `{#if}` / `{#each}` blocks, `{@render}` and one instance `<script>`.
//! Embedded expressions are captured as source text with their spans and are
//! parsed by oxc later.

use crate::error::{CompileError, Result};
use crate::template::{
    Attribute, AttributePart, AttributeValue, Comment, EachBlock, Element, Expression, Fragment,
    IfBlock, MustacheTag, Node, RenderTag, Root, Script, ScriptLang, Span, Text,
};

/// Parse a whole component file.
pub fn parse_component(source: &str) -> Result<Root> {
    let mut parser = TemplateParser::new(source);
    let fragment = parser.parse_nodes()?;

    if !parser.at_end() {
        let rest = &source[parser.pos..];
        let message = if rest.starts_with("</") {
            let name = rest[2..]
                .split(|c: char| c == '>' || c.is_whitespace())
                .next()
                .unwrap_or_default();
            format!("Unexpected closing tag </{}>.", name)
        } else {
            format!("Unexpected block continuation '{}'.", block_head(rest))
        };
        return Err(CompileError::parse(message, parser.span_from(parser.pos)));
    }

    Ok(Root {
        instance: parser.instance,
        fragment,
    })
}

/// Check if a tag name refers to a sub-component rather than a widget.
pub fn is_component_tag(tag_name: &str) -> bool {
    tag_name
        .chars()
        .next()
        .map(|c| c.is_uppercase())
        .unwrap_or(false)
        || tag_name.contains('.')
}

/// Leading `{...}` of `rest` for error messages, at most 32 bytes and cut on a char boundary.
fn block_head(rest: &str) -> &str {
    let end = rest.find('}').map(|i| i + 1).unwrap_or(rest.len());
    let end = rest
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|&i| i <= end.min(32))
        .last()
        .unwrap_or(0);
    &rest[..end]
}

// ═══════════════════════════════════════════════════════════════════════════════
// BALANCED SCANNING
// ═══════════════════════════════════════════════════════════════════════════════

/// Find the end of the brace expression opened at `open`, skipping string,
/// template and comment contents. Returns the index after the closing brace.
pub(crate) fn find_balanced_brace_end(src: &str, open: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut stack: Vec<u8> = Vec::new();
    let mut i = open;

    while i < bytes.len() {
        let c = bytes[i];
        let next = bytes.get(i + 1).copied();

        if stack.last() == Some(&b'`') {
            match c {
                b'\\' => {
                    i += 2;
                    continue;
                }
                b'`' => {
                    stack.pop();
                }
                b'$' if next == Some(b'{') => {
                    stack.push(b'{');
                    i += 2;
                    continue;
                }
                _ => {}
            }
            i += 1;
            continue;
        }

        match c {
            b'"' | b'\'' => {
                i += 1;
                while i < bytes.len() && bytes[i] != c {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'`' => stack.push(b'`'),
            b'{' => stack.push(b'{'),
            b'}' => {
                stack.pop();
                if stack.is_empty() {
                    return Some(i + 1);
                }
            }
            b'/' if next == Some(b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if next == Some(b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }

    None
}

/// Find the bracket closing the one at `open` (`(`/`[`/`{`), ignoring strings.
fn find_matching_bracket(src: &str, open: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    let mut depth = 0i32;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            q @ (b'"' | b'\'' | b'`') => {
                i += 1;
                while i < bytes.len() && bytes[i] != q {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", "\u{a0}")
        .replace("&#123;", "{")
        .replace("&#125;", "}")
        .replace("&amp;", "&")
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSER
// ═══════════════════════════════════════════════════════════════════════════════

struct TemplateParser<'s> {
    src: &'s str,
    pos: usize,
    instance: Option<Script>,
}

impl<'s> TemplateParser<'s> {
    fn new(src: &'s str) -> Self {
        Self {
            src,
            pos: 0,
            instance: None,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn rest(&self) -> &'s str {
        &self.src[self.pos..]
    }

    fn starts_with(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(start as u32, self.pos.max(start + 1).min(self.src.len()) as u32)
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn eat(&mut self, s: &str) -> bool {
        if self.starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, s: &str, what: &str) -> Result<()> {
        if self.eat(s) {
            Ok(())
        } else {
            Err(CompileError::parse(
                format!("Expected {}.", what),
                self.span_from(self.pos),
            ))
        }
    }

    fn read_while(&mut self, pred: impl Fn(char) -> bool) -> &'s str {
        let start = self.pos;
        let len = self
            .rest()
            .char_indices()
            .find(|(_, c)| !pred(*c))
            .map(|(i, _)| i)
            .unwrap_or(self.rest().len());
        self.pos += len;
        &self.src[start..self.pos]
    }

    /// Trimmed expression text between `start` and `end`, with its span.
    fn expression(&self, start: usize, end: usize) -> Expression {
        let raw = &self.src[start..end];
        let lead = raw.len() - raw.trim_start().len();
        let code = raw.trim();
        let code_start = start + lead;
        Expression {
            code: code.to_string(),
            span: Span::new(code_start as u32, (code_start + code.len()) as u32),
        }
    }

    /// Parse a `{...}` tag starting at the current `{`, returning the inner range.
    fn read_braced(&mut self) -> Result<(usize, usize)> {
        let open = self.pos;
        let end = find_balanced_brace_end(self.src, open).ok_or_else(|| {
            CompileError::parse("Unclosed '{' in template.", self.span_from(open))
        })?;
        self.pos = end;
        Ok((open + 1, end - 1))
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Nodes
    // ───────────────────────────────────────────────────────────────────────────

    /// Parse sibling nodes until a closing tag, a block continuation or EOF.
    fn parse_nodes(&mut self) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();

        while !self.at_end() {
            if self.starts_with("</") || self.starts_with("{:") || self.starts_with("{/") {
                break;
            }

            if self.starts_with("<!--") {
                nodes.push(self.parse_comment()?);
            } else if self.starts_with("<") {
                if let Some(node) = self.parse_element()? {
                    nodes.push(node);
                }
            } else if self.starts_with("{#") {
                nodes.push(self.parse_block()?);
            } else if self.starts_with("{@") {
                nodes.push(self.parse_special_tag()?);
            } else if self.starts_with("{") {
                let start = self.pos;
                let (inner_start, inner_end) = self.read_braced()?;
                let expression = self.expression(inner_start, inner_end);
                if expression.code.is_empty() {
                    return Err(CompileError::parse(
                        "Empty expression in template.",
                        self.span_from(start),
                    ));
                }
                nodes.push(Node::MustacheTag(MustacheTag {
                    expression,
                    span: self.span_from(start),
                }));
            } else {
                nodes.push(self.parse_text());
            }
        }

        Ok(nodes)
    }

    fn parse_text(&mut self) -> Node {
        let start = self.pos;
        let len = self
            .rest()
            .find(|c| c == '<' || c == '{')
            .unwrap_or(self.rest().len());
        self.pos += len.max(1).min(self.rest().len());
        Node::Text(Text {
            data: decode_entities(&self.src[start..self.pos]),
            span: self.span_from(start),
        })
    }

    fn parse_comment(&mut self) -> Result<Node> {
        let start = self.pos;
        self.pos += 4;
        let end = self.rest().find("-->").ok_or_else(|| {
            CompileError::parse("Unclosed comment.", Span::new(start as u32, start as u32 + 4))
        })?;
        let data = self.rest()[..end].to_string();
        self.pos += end + 3;
        Ok(Node::Comment(Comment {
            data,
            span: self.span_from(start),
        }))
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Elements
    // ───────────────────────────────────────────────────────────────────────────

    fn parse_element(&mut self) -> Result<Option<Node>> {
        let start = self.pos;
        self.pos += 1;
        let name = self.read_while(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'));
        if name.is_empty() {
            return Err(CompileError::parse(
                "Expected a tag name after '<'.",
                self.span_from(start),
            ));
        }

        if name == "script" || name == "style" {
            return self.parse_raw_block(start, name);
        }

        let attributes = self.parse_attributes()?;
        let self_closing = self.eat("/>");
        if !self_closing {
            self.expect(">", &format!("'>' to close <{}>", name))?;
        }

        let children = if self_closing {
            Vec::new()
        } else {
            let children = self.parse_nodes()?;
            let close = format!("</{}", name);
            if !self.eat(&close) {
                let message = if self.at_end() {
                    format!("<{}> was left open.", name)
                } else {
                    format!("Expected closing tag </{}>.", name)
                };
                return Err(CompileError::parse(
                    message,
                    Span::new(start as u32, (start + name.len() + 1) as u32),
                ));
            }
            self.skip_whitespace();
            self.expect(">", &format!("'>' to close </{}>", name))?;
            children
        };

        let element = Element {
            name: name.to_string(),
            attributes,
            children,
            span: self.span_from(start),
        };

        let node = if name == "svelte:fragment" {
            Node::Fragment(Fragment {
                children: element.children,
                span: element.span,
            })
        } else if name.starts_with("svelte:") {
            return Err(CompileError::parse(
                format!("<{}> is not supported.", name),
                element.span,
            ));
        } else if is_component_tag(name) {
            Node::InlineComponent(element)
        } else {
            Node::Element(element)
        };
        Ok(Some(node))
    }

    /// `<script>` becomes the instance script; `<style>` is skipped.
    fn parse_raw_block(&mut self, start: usize, name: &str) -> Result<Option<Node>> {
        let attributes = self.parse_attributes()?;
        self.expect(">", &format!("'>' to close <{}>", name))?;
        let content_start = self.pos;
        let close = format!("</{}>", name);
        let len = self.rest().find(&close).ok_or_else(|| {
            CompileError::parse(
                format!("<{}> was left open.", name),
                Span::new(start as u32, (start + name.len() + 1) as u32),
            )
        })?;
        let content = &self.src[content_start..content_start + len];
        self.pos = content_start + len + close.len();
        let span = self.span_from(start);

        if name == "style" {
            log::warn!("<style> blocks are ignored; use a GTK CSS provider instead");
            return Ok(None);
        }

        let is_module = attributes.iter().any(|attr| {
            attr.name == "module"
                || (attr.name == "context"
                    && matches!(&attr.value, AttributeValue::Text(v) if v == "module"))
        });
        if is_module {
            return Err(CompileError::parse(
                "Module-level <script> blocks are not supported.",
                span,
            ));
        }
        if self.instance.is_some() {
            return Err(CompileError::parse(
                "A component can only have one instance-level <script> element.",
                span,
            ));
        }

        let lang = attributes
            .iter()
            .find(|attr| attr.name == "lang")
            .map(|attr| match &attr.value {
                AttributeValue::Text(v) if v == "ts" || v == "typescript" => ScriptLang::Ts,
                _ => ScriptLang::Js,
            })
            .unwrap_or_default();

        self.instance = Some(Script {
            content: content.to_string(),
            content_start: content_start as u32,
            lang,
            span,
        });
        Ok(None)
    }

    fn parse_attributes(&mut self) -> Result<Vec<Attribute>> {
        let mut attributes = Vec::new();
        loop {
            self.skip_whitespace();
            if self.at_end() || self.starts_with(">") || self.starts_with("/>") {
                return Ok(attributes);
            }

            let start = self.pos;

            // Shorthand `{name}`
            if self.starts_with("{") {
                let (inner_start, inner_end) = self.read_braced()?;
                let expression = self.expression(inner_start, inner_end);
                if expression.code.starts_with("...") {
                    return Err(CompileError::parse(
                        "Spread attributes are not supported.",
                        self.span_from(start),
                    ));
                }
                attributes.push(Attribute {
                    name: expression.code.clone(),
                    value: AttributeValue::Expression(expression),
                    span: self.span_from(start),
                });
                continue;
            }

            let name =
                self.read_while(|c| !c.is_whitespace() && !matches!(c, '=' | '>' | '/' | '"' | '\''));
            if name.is_empty() {
                return Err(CompileError::parse(
                    "Malformed attribute.",
                    self.span_from(start),
                ));
            }

            self.skip_whitespace();
            let value = if self.eat("=") {
                self.skip_whitespace();
                self.parse_attribute_value()?
            } else {
                AttributeValue::Boolean
            };

            attributes.push(Attribute {
                name: name.to_string(),
                value,
                span: self.span_from(start),
            });
        }
    }

    fn parse_attribute_value(&mut self) -> Result<AttributeValue> {
        if self.starts_with("{") {
            let (inner_start, inner_end) = self.read_braced()?;
            return Ok(AttributeValue::Expression(
                self.expression(inner_start, inner_end),
            ));
        }

        let quote = match self.rest().chars().next() {
            Some(q @ ('"' | '\'')) => {
                self.pos += 1;
                Some(q)
            }
            _ => None,
        };

        let mut parts = Vec::new();
        let mut text_start = self.pos;
        loop {
            let Some(c) = self.rest().chars().next() else {
                return Err(CompileError::parse(
                    "Unterminated attribute value.",
                    self.span_from(text_start),
                ));
            };
            let at_end = match quote {
                Some(q) => c == q,
                None => c.is_whitespace() || c == '>' || self.starts_with("/>"),
            };
            if at_end || c == '{' {
                if self.pos > text_start {
                    parts.push(AttributePart::Text(decode_entities(
                        &self.src[text_start..self.pos],
                    )));
                }
                if at_end {
                    if quote.is_some() {
                        self.pos += 1;
                    }
                    break;
                }
                let (inner_start, inner_end) = self.read_braced()?;
                parts.push(AttributePart::Expression(
                    self.expression(inner_start, inner_end),
                ));
                text_start = self.pos;
                continue;
            }
            self.pos += c.len_utf8();
        }

        Ok(match parts.len() {
            0 => AttributeValue::Text(String::new()),
            1 => match parts.remove(0) {
                AttributePart::Text(text) => AttributeValue::Text(text),
                AttributePart::Expression(expr) => AttributeValue::Expression(expr),
            },
            _ => AttributeValue::Concat(parts),
        })
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Blocks
    // ───────────────────────────────────────────────────────────────────────────

    fn parse_block(&mut self) -> Result<Node> {
        let start = self.pos;
        let (inner_start, inner_end) = self.read_braced()?;
        // skip '#'
        let header = &self.src[inner_start + 1..inner_end];
        let keyword_len = header
            .find(|c: char| c.is_whitespace())
            .unwrap_or(header.len());
        let keyword = &header[..keyword_len];
        let args_start = inner_start + 1 + keyword_len;

        match keyword {
            "if" => {
                let test = self.expression(args_start, inner_end);
                self.parse_if_chain(start, test, false).map(Node::IfBlock)
            }
            "each" => self.parse_each(start, args_start, inner_end).map(Node::EachBlock),
            _ => Err(CompileError::parse(
                format!("Unsupported block type {{#{}}}.", keyword),
                self.span_from(start),
            )),
        }
    }

    fn parse_if_chain(&mut self, start: usize, test: Expression, elseif: bool) -> Result<IfBlock> {
        if test.code.is_empty() {
            return Err(CompileError::parse(
                "{#if} requires a condition.",
                self.span_from(start),
            ));
        }
        let consequent = self.parse_nodes()?;
        let cont = self.pos;

        let alternate = if self.starts_with("{:else") {
            let (inner_start, inner_end) = self.read_braced()?;
            let rest = self.src[inner_start + 1..inner_end].trim_start_matches("else");
            if let Some(cond) = rest.trim_start().strip_prefix("if") {
                let cond_start = inner_end - cond.len();
                let nested_test = self.expression(cond_start, inner_end);
                let nested = self.parse_if_chain(cont, nested_test, true)?;
                return Ok(IfBlock {
                    test,
                    consequent,
                    alternate: Some(vec![Node::IfBlock(nested)]),
                    elseif,
                    span: self.span_from(start),
                });
            }
            if !rest.trim().is_empty() {
                return Err(CompileError::parse(
                    "Expected {:else} or {:else if ...}.",
                    self.span_from(cont),
                ));
            }
            Some(self.parse_nodes()?)
        } else {
            None
        };

        self.expect_block_close("if", start)?;
        Ok(IfBlock {
            test,
            consequent,
            alternate,
            elseif,
            span: self.span_from(start),
        })
    }

    fn parse_each(&mut self, start: usize, args_start: usize, args_end: usize) -> Result<EachBlock> {
        let args = &self.src[args_start..args_end];
        let as_at = find_top_level_as(args).ok_or_else(|| {
            CompileError::parse(
                "{#each} requires the form {#each items as item}.",
                self.span_from(start),
            )
        })?;
        let expression = self.expression(args_start, args_start + as_at);

        // Context pattern, optional index, optional key.
        let cursor = args_start + as_at + 4;
        let cursor = args_end - self.src[cursor..args_end].trim_start().len();
        let context_end = if matches!(self.src.as_bytes().get(cursor), Some(b'{' | b'[')) {
            find_matching_bracket(&self.src[..args_end], cursor).ok_or_else(|| {
                CompileError::parse("Unbalanced {#each} pattern.", self.span_from(start))
            })?
        } else {
            cursor
                + self.src[cursor..args_end]
                    .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
                    .unwrap_or(args_end - cursor)
        };
        let context = self.expression(cursor, context_end);
        if context.code.is_empty() {
            return Err(CompileError::parse(
                "{#each} is missing an item name.",
                self.span_from(start),
            ));
        }

        let mut tail = self.src[context_end..args_end].trim_start();
        let mut index = None;
        if let Some(after_comma) = tail.strip_prefix(',') {
            let after_comma = after_comma.trim_start();
            let len = after_comma
                .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
                .unwrap_or(after_comma.len());
            if len == 0 {
                return Err(CompileError::parse(
                    "Expected an index name after ',' in {#each}.",
                    self.span_from(start),
                ));
            }
            index = Some(after_comma[..len].to_string());
            tail = after_comma[len..].trim_start();
        }

        let tail = tail.trim_end();
        let mut key = None;
        if tail.len() >= 2 && tail.starts_with('(') && tail.ends_with(')') {
            let tail_start = tail.as_ptr() as usize - self.src.as_ptr() as usize;
            key = Some(self.expression(tail_start + 1, tail_start + tail.len() - 1));
            log::warn!("keyed {{#each}} blocks are rendered without keyed diffing");
        } else if !tail.is_empty() {
            return Err(CompileError::parse(
                format!("Unexpected '{}' in {{#each}} header.", tail),
                self.span_from(start),
            ));
        }

        let body = self.parse_nodes()?;
        let fallback = if self.starts_with("{:else") {
            let (inner_start, inner_end) = self.read_braced()?;
            if self.src[inner_start + 1..inner_end].trim() != "else" {
                return Err(CompileError::parse(
                    "{#each} only supports a plain {:else} branch.",
                    self.span_from(inner_start - 1),
                ));
            }
            Some(self.parse_nodes()?)
        } else {
            None
        };

        self.expect_block_close("each", start)?;
        Ok(EachBlock {
            expression,
            context,
            index,
            key,
            body,
            fallback,
            span: self.span_from(start),
        })
    }

    fn expect_block_close(&mut self, keyword: &str, start: usize) -> Result<()> {
        let close = format!("{{/{}}}", keyword);
        if self.eat(&close) {
            return Ok(());
        }
        let message = if self.at_end() {
            format!("{{#{}}} block was never closed.", keyword)
        } else {
            format!(
                "Expected {} but found '{}'.",
                close,
                block_head(self.rest())
            )
        };
        Err(CompileError::parse(
            message,
            Span::new(start as u32, (start + keyword.len() + 2) as u32),
        ))
    }

    fn parse_special_tag(&mut self) -> Result<Node> {
        let start = self.pos;
        let (inner_start, inner_end) = self.read_braced()?;
        let header = &self.src[inner_start + 1..inner_end];
        match header.strip_prefix("render") {
            Some(rest) if rest.starts_with(char::is_whitespace) => {
                let expression = self.expression(inner_end - rest.len(), inner_end);
                Ok(Node::RenderTag(RenderTag {
                    expression,
                    span: self.span_from(start),
                }))
            }
            _ => Err(CompileError::parse(
                format!("Unsupported tag {{@{}}}.", header.split_whitespace().next().unwrap_or("")),
                self.span_from(start),
            )),
        }
    }
}

/// Byte offset of the ` as ` keyword separating an each-block's iterable from
/// its binder, ignoring occurrences nested in brackets or strings.
fn find_top_level_as(args: &str) -> Option<usize> {
    let bytes = args.as_bytes();
    let mut depth = 0i32;
    let mut found = None;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            q @ (b'"' | b'\'' | b'`') => {
                i += 1;
                while i < bytes.len() && bytes[i] != q {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            c if depth == 0 && c.is_ascii_whitespace() => {
                if bytes.get(i + 1) == Some(&b'a')
                    && bytes.get(i + 2) == Some(&b's')
                    && bytes.get(i + 3).is_some_and(|b| b.is_ascii_whitespace())
                {
                    found = Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_brace_skips_strings() {
        let src = r#"{ "}" + '{' + `${a}` }rest"#;
        let end = find_balanced_brace_end(src, 0).unwrap();
        assert_eq!(&src[end..], "rest");
    }

    #[test]
    fn test_find_top_level_as() {
        assert_eq!(find_top_level_as(" items as item"), Some(6));
        assert_eq!(find_top_level_as(" f(x as y) as z"), Some(10));
        assert_eq!(find_top_level_as(" items"), None);
    }

    #[test]
    fn test_component_tag_detection() {
        assert!(is_component_tag("Button"));
        assert!(is_component_tag("ui.Card"));
        assert!(!is_component_tag("box"));
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("a &lt;b&gt; &amp;lt;"), "a <b> &lt;");
    }
}
