//! Widget/attribute registry.
//!
//! Static, read-only mapping from template tag to GTK class, container arity
//! and accepted attributes. A shared pool of layout attributes is merged into
//! every entry when attributes are checked.

use std::collections::BTreeMap;

use lazy_static::lazy_static;

use crate::error::{CompileError, Result};
use crate::template::Span;

/// How a widget holds children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// No child widgets; text children feed the text setter.
    None,
    /// One child slot, filled with `set_child`.
    Single,
    /// Ordered children, added with `append`.
    Multiple,
}

/// Attributes with keyword values that map onto GTK enums or arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueTransformer {
    Orientation,
    Align,
    CssClasses,
}

pub const COMMON_LAYOUT_PROPS: &[&str] = &[
    "vexpand",
    "hexpand",
    "valign",
    "halign",
    "margin_top",
    "margin_bottom",
    "margin_start",
    "margin_end",
    "css_classes",
    "tooltip_text",
    "sensitive",
    "visible",
];

/// Properties whose literal values stay strings even when they look numeric.
const STRING_PROPS: &[&str] = &[
    "label",
    "text",
    "placeholder_text",
    "icon_name",
    "file",
    "resource",
    "title",
    "tooltip_text",
];

#[derive(Debug, Clone)]
pub struct WidgetDescriptor {
    pub tag: &'static str,
    pub class: &'static str,
    pub arity: Arity,
    attributes: &'static [&'static str],
    /// Property kept in sync by `bind={x}`.
    pub bind_property: Option<&'static str>,
    /// Setter receiving text children of an arity-none widget.
    pub text_setter: Option<&'static str>,
}

impl WidgetDescriptor {
    pub fn accepts(&self, attribute: &str) -> bool {
        self.attributes.contains(&attribute) || COMMON_LAYOUT_PROPS.contains(&attribute)
    }

    /// Own attributes followed by the common layout pool.
    pub fn accepted_attributes(&self) -> Vec<&'static str> {
        self.attributes
            .iter()
            .chain(COMMON_LAYOUT_PROPS.iter())
            .copied()
            .collect()
    }

    pub fn transformer(&self, attribute: &str) -> Option<ValueTransformer> {
        match attribute {
            "orientation" => Some(ValueTransformer::Orientation),
            "valign" | "halign" => Some(ValueTransformer::Align),
            "css_classes" => Some(ValueTransformer::CssClasses),
            _ => None,
        }
    }

    pub fn unsupported_attribute(&self, attribute: &str, span: Span) -> CompileError {
        CompileError::lowering(
            format!(
                "Unsupported attribute '{}' for <{}>. Available attributes are: {}.",
                attribute,
                self.tag,
                self.accepted_attributes().join(", ")
            ),
            span,
        )
    }
}

macro_rules! widget {
    ($tag:literal, $class:literal, $arity:ident, [$($attr:literal),* $(,)?]) => {
        widget!($tag, $class, $arity, [$($attr),*], None, None)
    };
    ($tag:literal, $class:literal, $arity:ident, [$($attr:literal),* $(,)?], $bind:expr, $text:expr) => {
        WidgetDescriptor {
            tag: $tag,
            class: $class,
            arity: Arity::$arity,
            attributes: &[$($attr),*],
            bind_property: $bind,
            text_setter: $text,
        }
    };
}

lazy_static! {
    static ref WIDGETS: BTreeMap<&'static str, WidgetDescriptor> = {
        let entries = [
            widget!("box", "Gtk.Box", Multiple, ["orientation", "spacing", "homogeneous", "baseline_position"]),
            widget!(
                "label",
                "Gtk.Label",
                None,
                [
                    "label", "use_markup", "use_underline", "selectable", "wrap", "wrap_mode", "lines",
                    "justify", "ellipsize", "width_chars", "max_width_chars", "xalign", "yalign",
                ],
                None,
                Some("set_label")
            ),
            widget!("button", "Gtk.Button", Single, ["label", "icon_name", "has_frame", "use_underline"]),
            widget!(
                "entry",
                "Gtk.Entry",
                None,
                [
                    "bind", "text", "placeholder_text", "visibility", "editable", "max_length", "has_frame",
                    "activates_default", "input_purpose", "input_hints",
                ],
                Some("text"),
                Some("set_text")
            ),
            widget!("switch", "Gtk.Switch", None, ["bind", "active", "state"], Some("active"), None),
            widget!(
                "spinbutton",
                "Gtk.SpinButton",
                None,
                ["bind", "value", "digits", "numeric", "wrap", "snap_to_ticks"],
                Some("value"),
                None
            ),
            widget!(
                "checkbutton",
                "Gtk.CheckButton",
                None,
                ["label", "bind", "active", "inconsistent", "use_underline"],
                Some("active"),
                Some("set_label")
            ),
            widget!("image", "Gtk.Image", None, ["icon_name", "file", "resource", "pixel_size", "icon_size"]),
            widget!("spinner", "Gtk.Spinner", None, ["bind", "spinning"], Some("spinning"), None),
            widget!(
                "scrolledwindow",
                "Gtk.ScrolledWindow",
                Single,
                [
                    "hscrollbar_policy", "vscrollbar_policy", "min_content_width", "min_content_height",
                    "max_content_width", "max_content_height", "overlay_scrolling", "propagate_natural_width",
                    "propagate_natural_height", "has_frame",
                ]
            ),
            widget!(
                "grid",
                "Gtk.Grid",
                Multiple,
                ["row_spacing", "column_spacing", "row_homogeneous", "column_homogeneous", "baseline_row"]
            ),
            widget!("frame", "Gtk.Frame", Single, ["label", "label_xalign"]),
            widget!("separator", "Gtk.Separator", None, ["orientation"]),
            widget!(
                "progressbar",
                "Gtk.ProgressBar",
                None,
                ["fraction", "text", "show_text", "inverted", "pulse_step"],
                None,
                Some("set_text")
            ),
            widget!(
                "listbox",
                "Gtk.ListBox",
                Multiple,
                ["selection_mode", "show_separators", "activate_on_single_click"]
            ),
        ];
        entries.into_iter().map(|w| (w.tag, w)).collect()
    };
}

pub fn lookup(tag: &str) -> Option<&'static WidgetDescriptor> {
    WIDGETS.get(tag)
}

pub fn available_tags() -> Vec<&'static str> {
    WIDGETS.keys().copied().collect()
}

/// Look up a tag, failing with the list of supported tags.
pub fn resolve(tag: &str, span: Span) -> Result<&'static WidgetDescriptor> {
    lookup(tag).ok_or_else(|| {
        CompileError::lowering(
            format!(
                "Unsupported GTK tag: <{}>. Available tags are: {}.",
                tag,
                available_tags().join(", ")
            ),
            span,
        )
    })
}

/// `class` is spelled `css_classes` in GTK; dashes become underscores.
pub fn normalize_attribute_name(name: &str) -> String {
    if name == "class" {
        return "css_classes".to_string();
    }
    name.replace('-', "_")
}

pub fn is_string_property(name: &str) -> bool {
    STRING_PROPS.contains(&name)
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALUE TRANSFORMERS
// ═══════════════════════════════════════════════════════════════════════════════

impl ValueTransformer {
    /// Convert a literal attribute value at compile time.
    pub fn transform_literal(self, value: &str, span: Span) -> Result<String> {
        match self {
            ValueTransformer::Orientation => match value {
                "vertical" | "v" => Ok("Gtk.Orientation.VERTICAL".to_string()),
                "horizontal" | "h" => Ok("Gtk.Orientation.HORIZONTAL".to_string()),
                _ => Err(CompileError::lowering(
                    format!("Invalid orientation value: '{}'", value),
                    span,
                )),
            },
            ValueTransformer::Align => match value.to_lowercase().as_str() {
                "fill" => Ok("Gtk.Align.FILL".to_string()),
                "start" => Ok("Gtk.Align.START".to_string()),
                "end" => Ok("Gtk.Align.END".to_string()),
                "center" => Ok("Gtk.Align.CENTER".to_string()),
                _ => Err(CompileError::lowering(
                    format!(
                        "Invalid alignment value: '{}'. Expected 'fill', 'start', 'end', or 'center'.",
                        value
                    ),
                    span,
                )),
            },
            ValueTransformer::CssClasses => {
                let classes: Vec<&str> = value.split_whitespace().collect();
                Ok(serde_json::to_string(&classes).unwrap_or_else(|_| "[]".to_string()))
            }
        }
    }

    /// Runtime helper applied to dynamic values.
    pub fn runtime_helper(self) -> &'static str {
        match self {
            ValueTransformer::Orientation => "$resolve_orientation",
            ValueTransformer::Align => "$resolve_align",
            ValueTransformer::CssClasses => "$resolve_css_classes",
        }
    }

    pub fn wrap_dynamic(self, code: &str) -> String {
        format!("{}({})", self.runtime_helper(), code)
    }
}

/// Literal attribute text as a JS value for `property`.
pub fn literal_value(property: &str, text: &str) -> String {
    if text == "true" || text == "false" {
        return text.to_string();
    }
    if !is_string_property(property) && is_numeric_literal(text) {
        return text.to_string();
    }
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{}\"", text))
}

fn is_numeric_literal(text: &str) -> bool {
    let body = text.strip_prefix('-').unwrap_or(text);
    !body.is_empty()
        && body.chars().all(|c| c.is_ascii_digit() || c == '.')
        && body.chars().filter(|&c| c == '.').count() <= 1
        && !body.starts_with('.')
        && !body.ends_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tag_lists_registry() {
        let err = resolve("foo", Span::new(0, 5)).unwrap_err();
        assert!(err.message.starts_with("Unsupported GTK tag: <foo>."));
        for tag in ["box", "button", "entry", "label", "listbox"] {
            assert!(err.message.contains(tag), "missing {} in {}", tag, err.message);
        }
    }

    #[test]
    fn test_common_props_merged() {
        let button = lookup("button").unwrap();
        assert!(button.accepts("label"));
        assert!(button.accepts("hexpand"));
        assert!(button.accepts("tooltip_text"));
        assert!(!button.accepts("orientation"));
    }

    #[test]
    fn test_unsupported_attribute_lists_accepted() {
        let label = lookup("label").unwrap();
        let err = label.unsupported_attribute("nonexistent", Span::new(3, 9));
        assert!(err.message.contains("'nonexistent' for <label>"));
        assert!(err.message.contains("use_markup"));
        assert!(err.message.contains("margin_top"));
    }

    #[test]
    fn test_orientation_values() {
        let t = ValueTransformer::Orientation;
        assert_eq!(t.transform_literal("v", Span::default()).unwrap(), "Gtk.Orientation.VERTICAL");
        assert_eq!(
            t.transform_literal("horizontal", Span::default()).unwrap(),
            "Gtk.Orientation.HORIZONTAL"
        );
        let err = t.transform_literal("diagonal", Span::new(1, 2)).unwrap_err();
        assert_eq!(err.message, "Invalid orientation value: 'diagonal'");
    }

    #[test]
    fn test_align_is_case_insensitive() {
        let t = ValueTransformer::Align;
        assert_eq!(t.transform_literal("Center", Span::default()).unwrap(), "Gtk.Align.CENTER");
        assert!(t.transform_literal("middle", Span::default()).is_err());
    }

    #[test]
    fn test_css_classes_split() {
        let t = ValueTransformer::CssClasses;
        assert_eq!(
            t.transform_literal(" title  accent ", Span::default()).unwrap(),
            r#"["title","accent"]"#
        );
    }

    #[test]
    fn test_literal_values() {
        assert_eq!(literal_value("hexpand", "true"), "true");
        assert_eq!(literal_value("spacing", "6"), "6");
        assert_eq!(literal_value("label", "6"), "\"6\"");
        assert_eq!(literal_value("label", "Hello"), "\"Hello\"");
        assert_eq!(literal_value("xalign", "0.5"), "0.5");
    }

    #[test]
    fn test_attribute_name_normalization() {
        assert_eq!(normalize_attribute_name("class"), "css_classes");
        assert_eq!(normalize_attribute_name("margin-top"), "margin_top");
    }
}
