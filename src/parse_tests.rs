#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::parse::parse_component;
    use crate::template::{AttributePart, AttributeValue, Node, ScriptLang};

    fn significant(nodes: &[Node]) -> Vec<&Node> {
        nodes.iter().filter(|n| !n.is_insignificant()).collect()
    }

    #[test]
    fn test_instance_script_extraction() {
        let source = "<script lang=\"ts\">\n  let count: number = $state(0);\n</script>\n<box></box>";
        let root = parse_component(source).unwrap();
        let script = root.instance.unwrap();
        assert_eq!(script.lang, ScriptLang::Ts);
        assert!(script.content.contains("let count: number = $state(0);"));
        let start = script.content_start as usize;
        assert_eq!(&source[start..start + script.content.len()], script.content);
        // The script is not part of the fragment
        assert_eq!(significant(&root.fragment).len(), 1);
    }

    #[test]
    fn test_style_block_is_skipped() {
        let root = parse_component("<style>box { color: red; }</style><label>hi</label>").unwrap();
        assert_eq!(root.fragment.len(), 1);
        assert!(matches!(&root.fragment[0], Node::Element(el) if el.name == "label"));
    }

    #[test]
    fn test_second_instance_script_is_rejected() {
        let err = parse_component("<script></script><script></script>").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
        assert!(err.message.contains("only have one instance-level"));
    }

    #[test]
    fn test_attribute_kinds() {
        let root = parse_component(
            r#"<entry editable text="plain" placeholder-text={hint} tooltip-text="Hi {name}!" bind:value={v} on:activate={go} />"#,
        )
        .unwrap();
        let Node::Element(el) = &root.fragment[0] else {
            panic!("expected element");
        };
        assert!(matches!(el.attributes[0].value, AttributeValue::Boolean));
        assert!(matches!(&el.attributes[1].value, AttributeValue::Text(t) if t == "plain"));
        assert!(matches!(&el.attributes[2].value, AttributeValue::Expression(e) if e.code == "hint"));
        let AttributeValue::Concat(parts) = &el.attributes[3].value else {
            panic!("expected concat");
        };
        assert_eq!(parts.len(), 3);
        assert!(matches!(&parts[1], AttributePart::Expression(e) if e.code == "name"));
        assert_eq!(el.attributes[4].directive(), ("bind", Some("value")));
        assert_eq!(el.attributes[5].directive(), ("on", Some("activate")));
    }

    #[test]
    fn test_expression_spans_point_into_source() {
        let source = "<label>{ count * 2 }</label>";
        let root = parse_component(source).unwrap();
        let Node::Element(el) = &root.fragment[0] else {
            panic!("expected element");
        };
        let Node::MustacheTag(tag) = &el.children[0] else {
            panic!("expected mustache tag");
        };
        assert_eq!(tag.expression.code, "count * 2");
        assert_eq!(&source[tag.expression.span.range()], "count * 2");
    }

    #[test]
    fn test_if_else_if_chain() {
        let root = parse_component("{#if a}<label/>{:else if b}<button/>{:else}<entry/>{/if}").unwrap();
        let Node::IfBlock(block) = &root.fragment[0] else {
            panic!("expected if block");
        };
        assert_eq!(block.test.code, "a");
        assert!(!block.elseif);
        let alternate = block.alternate.as_ref().unwrap();
        let Node::IfBlock(nested) = &alternate[0] else {
            panic!("expected nested if block");
        };
        assert!(nested.elseif);
        assert_eq!(nested.test.code, "b");
        assert!(nested.alternate.is_some());
    }

    #[test]
    fn test_each_header_forms() {
        let root = parse_component(
            "{#each todos.filter(t => t.done) as { id, text }, i (id)}<label>{text}</label>{:else}<label>none</label>{/each}",
        )
        .unwrap();
        let Node::EachBlock(block) = &root.fragment[0] else {
            panic!("expected each block");
        };
        assert_eq!(block.expression.code, "todos.filter(t => t.done)");
        assert_eq!(block.context.code, "{ id, text }");
        assert_eq!(block.index.as_deref(), Some("i"));
        assert_eq!(block.key.as_ref().map(|k| k.code.as_str()), Some("id"));
        assert!(block.fallback.is_some());
    }

    #[test]
    fn test_each_without_as_is_rejected() {
        let err = parse_component("{#each items}<label/>{/each}").unwrap_err();
        assert!(err.message.contains("{#each items as item}"));
    }

    #[test]
    fn test_render_tag() {
        let root = parse_component("<box>{@render children()}</box>").unwrap();
        let Node::Element(el) = &root.fragment[0] else {
            panic!("expected element");
        };
        assert!(matches!(&el.children[0], Node::RenderTag(tag) if tag.expression.code == "children()"));
    }

    #[test]
    fn test_components_and_fragments() {
        let root = parse_component(
            "<Counter start={1}><svelte:fragment><label>x</label></svelte:fragment></Counter>",
        )
        .unwrap();
        let Node::InlineComponent(el) = &root.fragment[0] else {
            panic!("expected component");
        };
        assert_eq!(el.name, "Counter");
        assert!(matches!(&el.children[0], Node::Fragment(_)));
    }

    #[test]
    fn test_unclosed_element_reports_opening_tag() {
        let err = parse_component("<box><label>hi</label>").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
        assert_eq!(err.message, "<box> was left open.");
        assert_eq!(err.span.map(|s| s.start), Some(0));
    }

    #[test]
    fn test_unclosed_block() {
        let err = parse_component("{#if ok}<label/>").unwrap_err();
        assert!(err.message.contains("never closed"));
    }

    #[test]
    fn test_stray_closing_tag() {
        let err = parse_component("<box></box></label>").unwrap_err();
        assert_eq!(err.message, "Unexpected closing tag </label>.");
    }

    #[test]
    fn test_multibyte_block_head_in_errors() {
        let err = parse_component("{/x日本語日本語日本語日本語日本語}").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
        assert_eq!(err.message, "Unexpected block continuation '{/x日本語日本語日本語'.");

        let err = parse_component("{#if a}{/x日本語日本語日本語日本語日本語}").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
        assert!(err.message.contains("'{/x日本語日本語日本語'"), "{}", err.message);
    }

    #[test]
    fn test_spread_attributes_are_rejected() {
        let err = parse_component("<box {...rest} />").unwrap_err();
        assert!(err.message.contains("Spread"));
    }

    #[test]
    fn test_comments_are_kept_as_nodes() {
        let root = parse_component("<!-- note --><box/>").unwrap();
        assert!(matches!(&root.fragment[0], Node::Comment(c) if c.data.trim() == "note"));
        assert_eq!(significant(&root.fragment).len(), 1);
    }
}
