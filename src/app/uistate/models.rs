use serde::{Deserialize, Serialize};

pub const VIRTUAL_ROOT_CLASS: &str = "VirtualRoot";
pub const DECOR_VIEW_CLASS: &str = "DecorView";

/// Screen used when a dump carries no usable geometry of its own.
pub const DEFAULT_SCREEN_WIDTH: i32 = 1080;
pub const DEFAULT_SCREEN_HEIGHT: i32 = 2400;

/// Axis-aligned rectangle in screen pixels. An all-zero value means "unknown".
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    /// Returns `None` unless `left <= right` and `top <= bottom`.
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Option<Self> {
        if left > right || top > bottom {
            return None;
        }
        Some(Self {
            left,
            top,
            right,
            bottom,
        })
    }

    pub fn screen(width: i32, height: i32) -> Self {
        Self {
            left: 0,
            top: 0,
            right: width.max(0),
            bottom: height.max(0),
        }
    }

    /// Widened so edges anywhere in the i32 range cannot overflow.
    pub fn width(&self) -> i64 {
        i64::from(self.right) - i64::from(self.left)
    }

    pub fn height(&self) -> i64 {
        i64::from(self.bottom) - i64::from(self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    pub fn center(&self) -> (i32, i32) {
        (
            midpoint(self.left, self.width()),
            midpoint(self.top, self.height()),
        )
    }

    /// Smallest rectangle containing every input, or `None` for an empty input.
    pub fn union_all<'a>(items: impl IntoIterator<Item = &'a Bounds>) -> Option<Bounds> {
        items.into_iter().fold(None, |acc, b| {
            Some(match acc {
                None => *b,
                Some(acc) => Bounds {
                    left: acc.left.min(b.left),
                    top: acc.top.min(b.top),
                    right: acc.right.max(b.right),
                    bottom: acc.bottom.max(b.bottom),
                },
            })
        })
    }

    /// `"left,top,right,bottom"`, the form carried by indexed elements.
    pub fn to_index_string(&self) -> String {
        format!("{},{},{},{}", self.left, self.top, self.right, self.bottom)
    }
}

/// `origin + extent / 2` lies between the two edges, so it always fits back in i32.
fn midpoint(origin: i32, extent: i64) -> i32 {
    let mid = i64::from(origin) + extent / 2;
    i32::try_from(mid).unwrap_or(origin)
}

/// One on-screen element. Children are kept in hierarchy order, which doubles as z-order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilityNode {
    pub class_name: String,
    pub text: String,
    pub resource_id: String,
    pub content_description: String,
    pub hint: String,
    #[serde(rename = "boundsInScreen")]
    pub bounds: Bounds,
    pub clickable: bool,
    pub focusable: bool,
    pub focused: bool,
    pub enabled: bool,
    pub scrollable: bool,
    pub checkable: bool,
    pub checked: bool,
    pub selected: bool,
    pub long_clickable: bool,
    pub password: bool,
    pub package: String,
    pub children: Vec<AccessibilityNode>,
}

impl Default for AccessibilityNode {
    fn default() -> Self {
        Self {
            class_name: String::new(),
            text: String::new(),
            resource_id: String::new(),
            content_description: String::new(),
            hint: String::new(),
            bounds: Bounds::default(),
            clickable: false,
            focusable: false,
            focused: false,
            enabled: true,
            scrollable: false,
            checkable: false,
            checked: false,
            selected: false,
            long_clickable: false,
            password: false,
            package: String::new(),
            children: Vec::new(),
        }
    }
}

impl AccessibilityNode {
    pub fn with_class(class_name: impl Into<String>, bounds: Bounds) -> Self {
        Self {
            class_name: class_name.into(),
            bounds,
            ..Self::default()
        }
    }

    /// Synthetic container for dumps with several top-level trees.
    pub fn virtual_root(children: Vec<AccessibilityNode>) -> Self {
        let bounds = Bounds::union_all(children.iter().map(|child| &child.bounds))
            .unwrap_or_else(|| Bounds::screen(DEFAULT_SCREEN_WIDTH, DEFAULT_SCREEN_HEIGHT));
        Self {
            children,
            ..Self::with_class(VIRTUAL_ROOT_CLASS, bounds)
        }
    }

    /// Collapses parser output into a single root, wrapping when needed.
    pub fn from_roots(mut roots: Vec<AccessibilityNode>) -> Option<Self> {
        match roots.len() {
            0 => None,
            1 => roots.pop(),
            _ => Some(Self::virtual_root(roots)),
        }
    }

    pub fn is_virtual_root(&self) -> bool {
        self.class_name == VIRTUAL_ROOT_CLASS
    }

    /// Pre-order walk, parents before children, siblings in hierarchy order.
    pub fn iter(&self) -> NodeIter<'_> {
        NodeIter { stack: vec![self] }
    }

    pub fn node_count(&self) -> usize {
        self.iter().count()
    }
}

pub struct NodeIter<'a> {
    stack: Vec<&'a AccessibilityNode>,
}

impl<'a> Iterator for NodeIter<'a> {
    type Item = &'a AccessibilityNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMethod {
    /// `uiautomator dump` XML.
    StructuredDump,
    /// `dumpsys activity top` view hierarchy text.
    TextDump,
}

impl AcquisitionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionMethod::StructuredDump => "structured-dump",
            AcquisitionMethod::TextDump => "text-dump",
        }
    }

    pub fn other(&self) -> Self {
        match self {
            AcquisitionMethod::StructuredDump => AcquisitionMethod::TextDump,
            AcquisitionMethod::TextDump => AcquisitionMethod::StructuredDump,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PhoneState {
    pub current_app: String,
    pub package_name: String,
    pub is_editable: bool,
    /// Only the accessibility bridge can resolve this; always `None` over plain adb.
    pub focused_element: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub const UNKNOWN_APP: &str = "Unknown";

impl Default for PhoneState {
    fn default() -> Self {
        Self {
            current_app: UNKNOWN_APP.to_string(),
            package_name: UNKNOWN_APP.to_string(),
            is_editable: false,
            focused_element: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScreenBounds {
    pub width: i32,
    pub height: i32,
}

impl Default for ScreenBounds {
    fn default() -> Self {
        Self {
            width: DEFAULT_SCREEN_WIDTH,
            height: DEFAULT_SCREEN_HEIGHT,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilteringParams {
    pub min_element_size: i32,
}

impl Default for FilteringParams {
    fn default() -> Self {
        Self { min_element_size: 5 }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceContext {
    pub screen_bounds: ScreenBounds,
    pub filtering_params: FilteringParams,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceStateSnapshot {
    pub a11y_tree: Option<AccessibilityNode>,
    pub phone_state: PhoneState,
    pub device_context: DeviceContext,
    pub method: Option<AcquisitionMethod>,
    pub captured_at: String,
}

/// Flattened, numbered element as handed to the agent layer. Indices are only meaningful
/// within the acquisition that produced them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IndexedElement {
    pub index: usize,
    pub class_name: String,
    pub text: String,
    pub resource_id: String,
    /// `"left,top,right,bottom"`.
    pub bounds: Option<String>,
    pub clickable: bool,
}
