use super::models::{AccessibilityNode, FilteringParams, IndexedElement};

/// Numbers visible elements from 1 in pre-order, which is also their drawing order.
///
/// The synthetic container is never indexed, and elements narrower or shorter than
/// `min_element_size` are skipped without hiding their descendants.
pub fn index_tree(root: &AccessibilityNode, params: &FilteringParams) -> Vec<IndexedElement> {
    let min = i64::from(params.min_element_size.max(0));
    root.iter()
        .filter(|node| !node.is_virtual_root())
        .filter(|node| node.bounds.width() >= min && node.bounds.height() >= min)
        .enumerate()
        .map(|(position, node)| IndexedElement {
            index: position + 1,
            class_name: node.class_name.clone(),
            text: node.text.clone(),
            resource_id: node.resource_id.clone(),
            bounds: Some(node.bounds.to_index_string()),
            clickable: node.clickable,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::uistate::models::Bounds;

    fn node(class: &str, bounds: (i32, i32, i32, i32)) -> AccessibilityNode {
        let (l, t, r, b) = bounds;
        AccessibilityNode::with_class(class, Bounds::new(l, t, r, b).expect("bounds"))
    }

    #[test]
    fn indexes_in_preorder_from_one() {
        let mut root = node("root", (0, 0, 100, 100));
        let mut list = node("list", (0, 0, 100, 80));
        list.children.push(node("row", (0, 0, 100, 20)));
        root.children.push(list);
        root.children.push(node("fab", (80, 80, 100, 100)));

        let indexed = index_tree(&root, &FilteringParams::default());
        let names: Vec<(usize, &str)> = indexed
            .iter()
            .map(|e| (e.index, e.class_name.as_str()))
            .collect();
        assert_eq!(names, vec![(1, "root"), (2, "list"), (3, "row"), (4, "fab")]);
        assert_eq!(indexed[3].bounds.as_deref(), Some("80,80,100,100"));
    }

    #[test]
    fn skips_virtual_root_and_tiny_elements() {
        let mut tiny = node("tiny", (0, 0, 3, 3));
        tiny.children.push(node("inside", (0, 0, 40, 40)));
        let root = AccessibilityNode::virtual_root(vec![tiny, node("big", (50, 50, 100, 100))]);

        let indexed = index_tree(&root, &FilteringParams { min_element_size: 5 });
        let names: Vec<&str> = indexed.iter().map(|e| e.class_name.as_str()).collect();
        assert_eq!(names, vec!["inside", "big"]);
        assert_eq!(indexed[0].index, 1);
    }

    #[test]
    fn indexes_elements_spanning_the_whole_i32_range() {
        let mut root = node("root", (0, 0, 1080, 2400));
        root.children.push(node("huge", (-2_000_000_000, 0, 2_000_000_000, 100)));
        root.children.push(node("edge", (i32::MIN, i32::MIN, i32::MAX, i32::MAX)));

        let indexed = index_tree(&root, &FilteringParams::default());
        assert_eq!(indexed.len(), 3);
        assert_eq!(indexed[1].bounds.as_deref(), Some("-2000000000,0,2000000000,100"));
        assert_eq!(indexed[2].index, 3);
    }
}
