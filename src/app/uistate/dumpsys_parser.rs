use regex::{Captures, Regex};
use tracing::{debug, warn};

use super::models::{
    AccessibilityNode, Bounds, DECOR_VIEW_CLASS, DEFAULT_SCREEN_HEIGHT, DEFAULT_SCREEN_WIDTH,
};
use crate::app::error::ParseFailure;

const HIERARCHY_MARKER: &str = "View Hierarchy:";
const CONTEXT_MARKERS: [&str; 2] = ["TASK ", "ACTIVITY "];
/// Looked up only after a context marker, when the primary marker is missing.
const LOOSE_HIERARCHY_MARKERS: [&str; 2] = ["View Hierarchy", "DecorView@"];
const SECTION_END_MARKERS: [&str; 6] = [
    "\n  Looper ",
    "\n  mHandler",
    "\n  ViewRoot",
    "\nTASK ",
    "\nACTIVITY ",
    "\n\n",
];

/// Parser for the `View Hierarchy:` section of `dumpsys activity top`:
///
/// ```text
/// View Hierarchy:
///   DecorView@12345678[MainActivity]
///     android.widget.LinearLayout{abc123 V.E...... ........ 0,0-1080,2400}
///       android.widget.FrameLayout{def456 V.E...... ........ 0,0-1080,2400 #1020002 android:id/content}
/// ```
///
/// Nesting comes from indentation alone. Flag letters vary between builds, so they
/// are decoded by membership rather than position and should be read as hints.
pub struct DumpsysParser {
    re_view: Regex,
    re_view_loose: Regex,
    re_bounds: Regex,
    re_resource_id: Regex,
}

impl Default for DumpsysParser {
    fn default() -> Self {
        Self {
            re_view: Regex::new(concat!(
                r"^(\s*)",
                r"([a-zA-Z0-9_.]+(?:\$[a-zA-Z0-9_]+)?)",
                r"\{([a-fA-F0-9]+)",
                r"\s+([VIGEFDS.]+)",
                r"\s+([.LCPXSHOD]+)",
                r"\s+(-?\d+),(-?\d+)-(-?\d+),(-?\d+)",
                r"(?:\s+#[a-fA-F0-9]+\s+([a-zA-Z0-9_.:$/]+))?",
                r"(?:\s+(.+?))?",
                r"\}",
            ))
            .expect("view line pattern"),
            re_view_loose: Regex::new(r"^(\s*)([a-zA-Z0-9_.$]+)\{([^}]+)\}")
                .expect("loose view line pattern"),
            re_bounds: Regex::new(r"(-?\d+),(-?\d+)-(-?\d+),(-?\d+)").expect("bounds pattern"),
            re_resource_id: Regex::new(r"#[a-fA-F0-9]+\s+([a-zA-Z0-9_.:$/]+)")
                .expect("resource id pattern"),
        }
    }
}

impl DumpsysParser {
    pub fn parse(&self, raw: &str) -> Option<AccessibilityNode> {
        match self.try_parse(raw) {
            Ok(root) => Some(root),
            Err(err) => {
                warn!(error = %err, "dumpsys view hierarchy parse failed");
                None
            }
        }
    }

    pub fn try_parse(&self, raw: &str) -> Result<AccessibilityNode, ParseFailure> {
        let section = self
            .extract_section(raw)
            .ok_or(ParseFailure::MissingPayload("View Hierarchy section"))?;
        let roots = self.build_tree(section.lines());
        debug!(roots = roots.len(), "parsed dumpsys view hierarchy");
        AccessibilityNode::from_roots(roots).ok_or(ParseFailure::Empty)
    }

    /// Slices the view hierarchy section out of a full dump.
    pub fn extract_section<'a>(&self, raw: &'a str) -> Option<&'a str> {
        let start = match find_section_start(raw) {
            Some(start) => start,
            None if self.re_bounds.is_match(raw) => return Some(raw),
            None => return None,
        };

        let end = SECTION_END_MARKERS
            .iter()
            .filter_map(|marker| raw[start..].find(marker).map(|offset| start + offset))
            .min()
            .unwrap_or(raw.len());

        let section = &raw[start..end];
        if section.trim().is_empty() {
            return None;
        }
        Some(section)
    }

    /// Rebuilds parent/child links from indentation. Unparseable lines are skipped.
    pub fn build_tree<'a>(&self, lines: impl Iterator<Item = &'a str>) -> Vec<AccessibilityNode> {
        let mut roots = Vec::new();
        // Open ancestors; a node is attached to its parent once it can gain no more children.
        let mut stack: Vec<(usize, AccessibilityNode)> = Vec::new();

        for line in lines {
            let Some(node) = self.parse_line(line) else {
                continue;
            };
            let indent = indentation(line);
            while stack.last().is_some_and(|(depth, _)| *depth >= indent) {
                close_top(&mut stack, &mut roots);
            }
            stack.push((indent, node));
        }
        while !stack.is_empty() {
            close_top(&mut stack, &mut roots);
        }
        roots
    }

    pub fn parse_line(&self, line: &str) -> Option<AccessibilityNode> {
        let line = line.trim_end();
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            return None;
        }
        if line.contains("DecorView@") || trimmed.starts_with(DECOR_VIEW_CLASS) {
            return Some(self.decor_view(line));
        }
        if let Some(caps) = self.re_view.captures(line) {
            return Some(node_from_strict(&caps));
        }
        let caps = self.re_view_loose.captures(line)?;
        self.node_from_loose(&caps)
    }

    fn decor_view(&self, line: &str) -> AccessibilityNode {
        let bounds = self
            .re_bounds
            .captures(line)
            .and_then(|caps| bounds_from(&caps, 1))
            .unwrap_or_else(|| Bounds::screen(DEFAULT_SCREEN_WIDTH, DEFAULT_SCREEN_HEIGHT));
        AccessibilityNode::with_class(DECOR_VIEW_CLASS, bounds)
    }

    fn node_from_loose(&self, caps: &Captures<'_>) -> Option<AccessibilityNode> {
        let body = &caps[3];
        let bounds = self
            .re_bounds
            .captures(body)
            .map(|b| bounds_from(&b, 1).unwrap_or_default())?;
        let resource_id = self
            .re_resource_id
            .captures(body)
            .map(|r| r[1].to_string())
            .unwrap_or_default();
        let has_flag = |flag: char| {
            body.contains(&format!(" {flag}")) || body.contains(&format!(".{flag}"))
        };

        Some(AccessibilityNode {
            class_name: caps[2].to_string(),
            resource_id,
            bounds,
            clickable: has_flag('C'),
            focused: has_flag('F'),
            enabled: has_flag('E'),
            ..AccessibilityNode::default()
        })
    }
}

fn node_from_strict(caps: &Captures<'_>) -> AccessibilityNode {
    let visibility = &caps[4];
    let other = &caps[5];

    AccessibilityNode {
        class_name: caps[2].to_string(),
        text: caps
            .get(11)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default(),
        resource_id: caps
            .get(10)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default(),
        bounds: bounds_from(caps, 6).unwrap_or_default(),
        enabled: visibility.contains('E'),
        focused: visibility.contains('F') || other.contains('F'),
        selected: visibility.contains('S'),
        clickable: other.contains('C'),
        long_clickable: other.contains('L'),
        focusable: other.contains('P') || other.contains('F'),
        ..AccessibilityNode::default()
    }
}

/// Reads four consecutive integer groups starting at `first`.
fn bounds_from(caps: &Captures<'_>, first: usize) -> Option<Bounds> {
    let value = |offset: usize| caps.get(first + offset)?.as_str().parse::<i32>().ok();
    Bounds::new(value(0)?, value(1)?, value(2)?, value(3)?)
}

fn find_section_start(raw: &str) -> Option<usize> {
    if let Some(idx) = raw.find(HIERARCHY_MARKER) {
        return Some(idx + HIERARCHY_MARKER.len());
    }
    let context = CONTEXT_MARKERS
        .iter()
        .filter_map(|marker| raw.find(marker))
        .min()?;
    LOOSE_HIERARCHY_MARKERS
        .iter()
        .filter_map(|marker| {
            let idx = context + raw[context..].find(marker)?;
            Some(if *marker == "DecorView@" {
                // Keep the decor line itself; it is the first element.
                raw[..idx].rfind('\n').map(|nl| nl + 1).unwrap_or(0)
            } else {
                raw[idx..]
                    .find('\n')
                    .map(|nl| idx + nl)
                    .unwrap_or(raw.len())
            })
        })
        .min()
}

fn indentation(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn close_top(stack: &mut Vec<(usize, AccessibilityNode)>, roots: &mut Vec<AccessibilityNode>) {
    if let Some((_, node)) = stack.pop() {
        match stack.last_mut() {
            Some((_, parent)) => parent.children.push(node),
            None => roots.push(node),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACTIVITY_TOP: &str = "\
TASK 10 id=42 userId=0
  ACTIVITY com.example.app/.MainActivity 8c1f2a0 pid=4242
    Local Activity 8c1f2a0 State:
      mResumed=true mStopped=false

    View Hierarchy:
      DecorView@5e1d9c1[MainActivity]
        android.widget.LinearLayout{abc123 V.E...... ........ 0,0-1080,2400}
          android.widget.FrameLayout{def456 V.E...... ........ 0,66-1080,2400 #1020002 android:id/content}
            android.widget.Button{1a2b3c VFED..... ...P.... 40,100-500,220 #7f0a0012 com.example.app:id/ok OK}
            android.widget.TextView{4d5e6f V.ED..... ........ 40,240-1040,300 #7f0a0013 com.example.app:id/title}
          android.view.View{789abc V.ED..... ........ 0,2300-1080,2400 #1020030 android:id/navigationBarBackground}
  Looper (main, tid 1) {a1b2c3}
    (Total messages: 0, polling=true, quitting=false)
";

    fn parser() -> DumpsysParser {
        DumpsysParser::default()
    }

    #[test]
    fn parses_activity_top_dump() {
        let root = parser().parse(ACTIVITY_TOP).expect("tree");
        assert_eq!(root.class_name, "DecorView");
        assert_eq!(root.bounds, Bounds::new(0, 0, 1080, 2400).unwrap());
        let linear = &root.children[0];
        assert_eq!(linear.class_name, "android.widget.LinearLayout");
        assert_eq!(linear.children.len(), 2);
        let content = &linear.children[0];
        assert_eq!(content.resource_id, "android:id/content");
        assert_eq!(content.bounds, Bounds::new(0, 66, 1080, 2400).unwrap());
        assert_eq!(content.children.len(), 2);
        assert_eq!(
            linear.children[1].resource_id,
            "android:id/navigationBarBackground"
        );
    }

    #[test]
    fn section_stops_at_looper() {
        let section = parser().extract_section(ACTIVITY_TOP).expect("section");
        assert!(section.contains("navigationBarBackground"));
        assert!(!section.contains("Looper"));
        assert!(!section.contains("mResumed"));
    }

    #[test]
    fn decodes_flags_and_text_from_strict_line() {
        let root = parser().parse(ACTIVITY_TOP).expect("tree");
        let button = &root.children[0].children[0].children[0];
        assert_eq!(button.class_name, "android.widget.Button");
        assert_eq!(button.resource_id, "com.example.app:id/ok");
        assert_eq!(button.text, "OK");
        assert!(button.enabled);
        assert!(button.focused);
        assert!(button.focusable);
        assert!(!button.clickable);
        assert!(!button.long_clickable);

        let title = &root.children[0].children[0].children[1];
        assert_eq!(title.text, "");
        assert!(title.enabled);
        assert!(!title.focused);
    }

    #[test]
    fn other_flag_cluster_sets_click_flags() {
        let node = parser()
            .parse_line("  android.widget.ImageView{77aa V.E...... .LC.S... 0,0-10,10}")
            .expect("node");
        assert!(node.clickable);
        assert!(node.long_clickable);
        assert!(!node.focusable);
        assert!(!node.selected);
    }

    #[test]
    fn indentation_determines_nesting() {
        let dump = "View Hierarchy:
  a.Root{1 V.E...... ........ 0,0-100,100}
    a.Child{2 V.E...... ........ 0,0-50,50}
      a.Grandchild{3 V.E...... ........ 0,0-10,10}
    a.Sibling{4 V.E...... ........ 50,50-100,100}
  a.SecondRoot{5 V.E...... ........ 0,0-20,20}
";
        let root = parser().parse(dump).expect("tree");
        assert!(root.is_virtual_root());
        let first = &root.children[0];
        assert_eq!(first.class_name, "a.Root");
        let names: Vec<&str> = first.children.iter().map(|c| c.class_name.as_str()).collect();
        assert_eq!(names, vec!["a.Child", "a.Sibling"]);
        assert_eq!(first.children[0].children[0].class_name, "a.Grandchild");
        assert_eq!(root.children[1].class_name, "a.SecondRoot");
    }

    #[test]
    fn disjoint_roots_get_union_container() {
        let dump = "View Hierarchy:
  a.Left{1 V.E...... ........ 0,0-50,50}
  a.Right{2 V.E...... ........ 50,50-100,100}
";
        let root = parser().parse(dump).expect("tree");
        assert!(root.is_virtual_root());
        assert_eq!(root.bounds, Bounds::new(0, 0, 100, 100).unwrap());
        assert_eq!(root.children.len(), 2);
    }

    #[test]
    fn loose_pattern_recovers_unusual_flag_clusters() {
        let line = "    com.vendor.CarView$Inner{9f0 V.E..C... zz 10,20-110,220 #7f01 com.vendor:id/tile}";
        let node = parser().parse_line(line).expect("node");
        assert_eq!(node.class_name, "com.vendor.CarView$Inner");
        assert_eq!(node.bounds, Bounds::new(10, 20, 110, 220).unwrap());
        assert_eq!(node.resource_id, "com.vendor:id/tile");
        assert!(node.enabled);
        assert!(node.clickable);
        assert!(!node.focused);
    }

    #[test]
    fn loose_pattern_requires_bounds() {
        assert!(parser().parse_line("  a.b.View{no geometry here}").is_none());
    }

    #[test]
    fn drops_noise_lines() {
        let dump = "View Hierarchy:
  a.Root{1 V.E...... ........ 0,0-100,100}
    continuation of a log message
    a.Child{2 V.E...... ........ 0,0-50,50}
";
        let root = parser().parse(dump).expect("tree");
        assert_eq!(root.class_name, "a.Root");
        assert_eq!(root.children.len(), 1);
    }

    #[test]
    fn decor_view_uses_inline_bounds_or_default() {
        let p = parser();
        let with_bounds = p.parse_line("  DecorView@1f[Main] 0,0-720,1280").expect("decor");
        assert_eq!(with_bounds.bounds, Bounds::new(0, 0, 720, 1280).unwrap());
        let without = p.parse_line("  DecorView@1f[Main]").expect("decor");
        assert_eq!(without.class_name, "DecorView");
        assert_eq!(without.bounds, Bounds::screen(1080, 2400));
        assert!(without.enabled);
    }

    #[test]
    fn falls_back_to_alternate_marker_after_activity() {
        let dump = "ACTIVITY com.example/.Main 1a pid=1
  mResumed=true
    DecorView@2b[Main]
      a.Root{1 V.E...... ........ 0,0-100,100}
";
        let root = parser().parse(dump).expect("tree");
        assert_eq!(root.class_name, "DecorView");
        assert_eq!(root.children[0].class_name, "a.Root");
    }

    #[test]
    fn falls_back_to_colonless_marker_after_task() {
        let dump = "TASK 7 id=12 userId=0
  ACTIVITY com.example/.Settings 3c pid=9
    mResumed=true
    View Hierarchy (window 0)
      a.Root{1 V.E...... ........ 0,0-100,100}
        a.Child{2 V.E...... ........ 0,0-50,50}
  Looper (main, tid 1) {ff00}
";
        let section = parser().extract_section(dump).expect("section");
        assert!(!section.contains("View Hierarchy"));
        assert!(!section.contains("Looper"));

        let root = parser().parse(dump).expect("tree");
        assert_eq!(root.class_name, "a.Root");
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].class_name, "a.Child");
    }

    #[test]
    fn treats_markerless_input_with_bounds_as_section() {
        let dump = "a.Root{1 V.E...... ........ 0,0-100,100}\n  a.Child{2 V.E...... ........ 0,0-10,10}";
        let root = parser().parse(dump).expect("tree");
        assert_eq!(root.children.len(), 1);
    }

    #[test]
    fn reports_missing_section_and_empty_section() {
        let p = parser();
        assert_eq!(
            p.try_parse("nothing useful"),
            Err(ParseFailure::MissingPayload("View Hierarchy section"))
        );
        assert_eq!(
            p.try_parse("View Hierarchy:\n  just some words\n"),
            Err(ParseFailure::Empty)
        );
    }
}
