use regex::Regex;
use tracing::{debug, warn};

use super::models::{AccessibilityNode, Bounds};
use crate::app::error::ParseFailure;

const HIERARCHY_OPEN: &str = "<hierarchy";
const HIERARCHY_CLOSE: &str = "</hierarchy>";
const XML_DECL: &str = "<?xml";

/// Parser for `uiautomator dump` output:
///
/// ```text
/// <hierarchy rotation="0">
///   <node index="0" text="" resource-id="" class="android.widget.FrameLayout"
///         package="com.android.launcher3" content-desc="" clickable="false"
///         enabled="true" ... bounds="[0,0][1080,2400]">
///     <node ...>...</node>
///   </node>
/// </hierarchy>
/// ```
pub struct XmlHierarchyParser {
    re_bounds: Regex,
}

impl Default for XmlHierarchyParser {
    fn default() -> Self {
        Self {
            re_bounds: Regex::new(r"^\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]")
                .expect("bounds pattern"),
        }
    }
}

impl XmlHierarchyParser {
    /// Parses a dump, logging and swallowing any failure.
    pub fn parse(&self, raw: &str) -> Option<AccessibilityNode> {
        match self.try_parse(raw) {
            Ok(root) => Some(root),
            Err(err) => {
                warn!(error = %err, "uiautomator xml parse failed");
                None
            }
        }
    }

    pub fn try_parse(&self, raw: &str) -> Result<AccessibilityNode, ParseFailure> {
        let payload = locate_payload(raw)?;
        let doc = roxmltree::Document::parse(payload)
            .map_err(|err| ParseFailure::Malformed(err.to_string()))?;
        let root = doc.root_element();

        if root.tag_name().name() != "hierarchy" {
            return self.parse_node(root).ok_or(ParseFailure::Empty);
        }

        let roots = root
            .children()
            .filter(|child| child.is_element())
            .filter_map(|child| self.parse_node(child))
            .collect::<Vec<_>>();
        debug!(roots = roots.len(), "parsed uiautomator hierarchy");
        AccessibilityNode::from_roots(roots).ok_or(ParseFailure::Empty)
    }

    fn parse_node(&self, element: roxmltree::Node<'_, '_>) -> Option<AccessibilityNode> {
        if element.tag_name().name() != "node" {
            return None;
        }
        let attr = |name: &str| element.attribute(name).unwrap_or_default().to_string();
        let flag = |name: &str, default: bool| {
            element
                .attribute(name)
                .map(|value| value.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(default)
        };

        let children = element
            .children()
            .filter(|child| child.is_element())
            .filter_map(|child| self.parse_node(child))
            .collect();

        Some(AccessibilityNode {
            class_name: attr("class"),
            text: attr("text"),
            resource_id: attr("resource-id"),
            content_description: attr("content-desc"),
            hint: attr("hint"),
            bounds: self.parse_bounds(element.attribute("bounds").unwrap_or_default()),
            clickable: flag("clickable", false),
            focusable: flag("focusable", false),
            focused: flag("focused", false),
            enabled: flag("enabled", true),
            scrollable: flag("scrollable", false),
            checkable: flag("checkable", false),
            checked: flag("checked", false),
            selected: flag("selected", false),
            long_clickable: flag("long-clickable", false),
            password: flag("password", false),
            package: attr("package"),
            children,
        })
    }

    /// `"[left,top][right,bottom]"`; missing or malformed input is the zero rectangle.
    pub fn parse_bounds(&self, raw: &str) -> Bounds {
        let Some(caps) = self.re_bounds.captures(raw.trim()) else {
            return Bounds::default();
        };
        let values = (1..=4)
            .map(|group| caps[group].parse::<i32>().ok())
            .collect::<Option<Vec<_>>>();
        match values.as_deref() {
            Some([left, top, right, bottom]) => {
                Bounds::new(*left, *top, *right, *bottom).unwrap_or_default()
            }
            _ => Bounds::default(),
        }
    }
}

/// Drops shell banners before the payload and trailing notices after it.
fn locate_payload(raw: &str) -> Result<&str, ParseFailure> {
    let trimmed = raw.trim();
    let start = if trimmed.starts_with(XML_DECL) || trimmed.starts_with(HIERARCHY_OPEN) {
        0
    } else {
        trimmed
            .find(HIERARCHY_OPEN)
            .ok_or(ParseFailure::MissingPayload("<hierarchy> tag"))?
    };
    let payload = &trimmed[start..];
    match payload.rfind(HIERARCHY_CLOSE) {
        Some(end) => Ok(&payload[..end + HIERARCHY_CLOSE.len()]),
        None => Ok(payload),
    }
}
