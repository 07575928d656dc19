#[cfg(test)]
mod tests {
    use crate::error::{ErrorKind, Result};
    use crate::template::{Expression, Span};
    use crate::transform::{
        parse_program, pattern_binding_names, print_program, source_type, transform_expression,
        transform_program, ExpressionShape,
    };
    use oxc_allocator::Allocator;
    use std::collections::HashSet;

    fn names(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn rewrite_script(code: &str, reactive: &[&str]) -> Result<String> {
        let allocator = Allocator::default();
        let mut program = parse_program(
            &allocator,
            code,
            source_type(),
            Span::new(0, code.len() as u32),
        )?;
        transform_program(&allocator, &mut program, &names(reactive))?;
        Ok(print_program(&program))
    }

    fn expr(code: &str) -> Expression {
        Expression {
            code: code.to_string(),
            span: Span::new(100, 100 + code.len() as u32),
        }
    }

    #[test]
    fn test_reads_and_plain_assignment() {
        let out = rewrite_script("count = count + 1;", &["count"]).unwrap();
        assert!(out.contains("$set(count, $get(count) + 1)"));
    }

    #[test]
    fn test_declarations_are_not_rewritten() {
        let out = rewrite_script("let count = $state(0);\nconsole.log(count);", &["count"]).unwrap();
        assert!(out.contains("let count = $state(0);"));
        assert!(out.contains("console.log($get(count))"));
    }

    #[test]
    fn test_compound_assignment() {
        let out = rewrite_script("count += 2;\ntotal *= count;", &["count", "total"]).unwrap();
        assert!(out.contains("$set(count, $get(count) + 2)"));
        assert!(out.contains("$set(total, $get(total) * $get(count))"));
    }

    #[test]
    fn test_logical_assignment() {
        let out = rewrite_script("name ??= 'anon';", &["name"]).unwrap();
        assert!(out.contains("$set(name, $get(name) ?? "));
    }

    #[test]
    fn test_update_expressions() {
        let out = rewrite_script("count++;\n--count;", &["count"]).unwrap();
        assert!(out.contains("$set(count, $get(count) + 1)"));
        assert!(out.contains("$set(count, $get(count) - 1)"));
    }

    #[test]
    fn test_mutation_is_followed_by_notify() {
        let out = rewrite_script("items.push(4);\nuser.age = 3;\nuser.visits++;", &["items", "user"])
            .unwrap();
        assert!(out.contains("$get(items).push(4), $notify(items)"));
        assert!(out.contains("$get(user).age = 3, $notify(user)"));
        assert!(out.contains("$get(user).visits++, $notify(user)"));
    }

    #[test]
    fn test_non_mutating_method_has_no_notify() {
        let out = rewrite_script("const n = items.filter(Boolean).length;", &["items"]).unwrap();
        assert!(out.contains("$get(items).filter(Boolean).length"));
        assert!(!out.contains("$notify"));
    }

    #[test]
    fn test_parameters_shadow_reactive_names() {
        let out = rewrite_script(
            "function double(count) { return count * 2; }\nconst f = (count) => count + 1;",
            &["count"],
        )
        .unwrap();
        assert!(!out.contains("$get(count)"));
    }

    #[test]
    fn test_block_scoped_shadowing() {
        let out = rewrite_script(
            "{ let count = 1; console.log(count); }\nconsole.log(count);",
            &["count"],
        )
        .unwrap();
        assert_eq!(out.matches("$get(count)").count(), 1);
    }

    #[test]
    fn test_loop_binders_shadow() {
        let out = rewrite_script(
            "for (const item of list) { console.log(item); }\nconsole.log(item);",
            &["item", "list"],
        )
        .unwrap();
        assert_eq!(out.matches("$get(item)").count(), 1);
        assert!(out.contains("of $get(list)"));
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let once = rewrite_script("count = count + 1;\nitems.push(1);", &["count", "items"]).unwrap();
        let twice = rewrite_script(&once, &["count", "items"]).unwrap();
        assert_eq!(once, twice);
        assert!(!twice.contains("$get($get"));
    }

    #[test]
    fn test_shorthand_property_is_expanded() {
        let out = rewrite_script("const snapshot = { count };", &["count"]).unwrap();
        assert!(out.contains("count: $get(count)"));
    }

    #[test]
    fn test_derived_forms() {
        let out = rewrite_script(
            "let doubled = $derived(count * 2);\nlet tripled = $derived.by(() => count * 3);",
            &["count"],
        )
        .unwrap();
        assert!(out.contains("$derived(() => $get(count) * 2)"));
        assert!(out.contains("$derived(() => $get(count) * 3)"));
        assert!(!out.contains("$derived.by"));
    }

    #[test]
    fn test_destructured_parameter_is_rejected() {
        let err = rewrite_script("function show({ name }) { return name; }", &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Analysis);
        assert!(err.message.starts_with("Destructured function parameters are not supported"));
        assert_eq!(err.span, Some(Span::new(14, 22)));
    }

    #[test]
    fn test_invalid_script() {
        let err = rewrite_script("let = ;", &[]).unwrap_err();
        assert!(err.message.starts_with("Invalid script:"));
    }

    #[test]
    fn test_template_expression_shapes() {
        let reactive = names(&["count"]);
        let none = HashSet::new();

        let rewritten = transform_expression(&expr("count"), &reactive, &none).unwrap();
        assert_eq!(rewritten.code, "$get(count)");
        assert_eq!(rewritten.shape, ExpressionShape::Identifier("count".to_string()));
        assert!(rewritten.is_reactive());

        let rewritten = transform_expression(&expr("() => count++"), &reactive, &none).unwrap();
        assert_eq!(rewritten.shape, ExpressionShape::Function);

        let rewritten = transform_expression(&expr("Math.max(1, 2)"), &reactive, &none).unwrap();
        assert_eq!(rewritten.shape, ExpressionShape::Other);
        assert!(!rewritten.is_reactive());
    }

    #[test]
    fn test_template_locals_shadow() {
        let rewritten =
            transform_expression(&expr("item.name + count"), &names(&["item", "count"]), &names(&["item"]))
                .unwrap();
        assert_eq!(rewritten.code, "item.name + $get(count)");
        assert_eq!(rewritten.reads.len(), 1);
    }

    #[test]
    fn test_template_destructured_arrow_is_allowed() {
        let rewritten = transform_expression(
            &expr("({ detail }) => detail + count"),
            &names(&["count", "detail"]),
            &HashSet::new(),
        )
        .unwrap();
        assert!(rewritten.code.contains("detail + $get(count)"));
    }

    #[test]
    fn test_type_assertions_are_dropped() {
        let rewritten = transform_expression(&expr("count as number"), &names(&["count"]), &HashSet::new())
            .unwrap();
        assert_eq!(rewritten.code, "$get(count)");
    }

    #[test]
    fn test_invalid_expression_span() {
        let err = transform_expression(&expr("a +"), &HashSet::new(), &HashSet::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Analysis);
        assert_eq!(err.span, Some(Span::new(100, 103)));
    }

    #[test]
    fn test_pattern_binding_names() {
        let bound = pattern_binding_names(&expr("{ id, meta: { tags }, ...rest }")).unwrap();
        assert_eq!(bound, names(&["id", "tags", "rest"]));
        let bound = pattern_binding_names(&expr("[first, second]")).unwrap();
        assert_eq!(bound, names(&["first", "second"]));
    }
}
