use super::models::Bounds;

/// Sample columns/rows per axis in addition to the blocker edges.
const GRID_STEPS: i64 = 8;

/// True when the rectangles share positive area. Touching edges do not count.
pub fn intersects(a: &Bounds, b: &Bounds) -> bool {
    a.left < b.right && b.left < a.right && a.top < b.bottom && b.top < a.bottom
}

fn covers(blocker: &Bounds, x: i32, y: i32) -> bool {
    blocker.left <= x && x <= blocker.right && blocker.top <= y && y <= blocker.bottom
}

/// Finds a point strictly inside `target` outside every blocker, nearest to the center.
///
/// Blockers are treated as closed rectangles, so the returned point never sits on a
/// blocker's edge. Candidate coordinates are the center, an evenly spaced grid and the
/// pixels just outside each blocker edge. That last set guarantees that any uncovered
/// interior pixel is found: the lowest such pixel in the leftmost uncovered column lies
/// either on the target's first interior row/column or one past a blocker edge.
///
/// Ties on distance are broken by row then column, so the result is deterministic.
pub fn find_clear_point(target: &Bounds, blockers: &[Bounds]) -> Option<(i32, i32)> {
    let (min_x, max_x) = (target.left.saturating_add(1), target.right.saturating_sub(1));
    let (min_y, max_y) = (target.top.saturating_add(1), target.bottom.saturating_sub(1));
    if min_x > max_x || min_y > max_y {
        return None;
    }

    let (center_x, center_y) = target.center();
    if !blockers.iter().any(|b| covers(b, center_x, center_y)) {
        return Some((center_x, center_y));
    }

    let xs = candidate_axis(
        center_x,
        target.left,
        target.width(),
        (min_x, max_x),
        blockers
            .iter()
            .flat_map(|b| [b.left.saturating_sub(1), b.right.saturating_add(1)]),
    );
    let ys = candidate_axis(
        center_y,
        target.top,
        target.height(),
        (min_y, max_y),
        blockers
            .iter()
            .flat_map(|b| [b.top.saturating_sub(1), b.bottom.saturating_add(1)]),
    );

    // i128 keeps the squared distance exact across the full i32 plane.
    let mut candidates: Vec<(i128, i32, i32)> = Vec::with_capacity(xs.len() * ys.len());
    for &y in &ys {
        for &x in &xs {
            let dx = i128::from(x) - i128::from(center_x);
            let dy = i128::from(y) - i128::from(center_y);
            candidates.push((dx * dx + dy * dy, y, x));
        }
    }
    candidates.sort_unstable();

    candidates
        .into_iter()
        .find(|&(_, y, x)| !blockers.iter().any(|b| covers(b, x, y)))
        .map(|(_, y, x)| (x, y))
}

fn candidate_axis(
    center: i32,
    origin: i32,
    extent: i64,
    (min, max): (i32, i32),
    edges: impl Iterator<Item = i32>,
) -> Vec<i32> {
    let mut values = vec![center, min, max];
    values.extend((1..GRID_STEPS).filter_map(|step| {
        i32::try_from(i64::from(origin) + extent * step / GRID_STEPS).ok()
    }));
    values.extend(edges);
    values.retain(|v| (min..=max).contains(v));
    values.sort_unstable();
    values.dedup();
    values
}

/// Parses `"left,top,right,bottom"`. Anything else, including inverted edges, is `None`.
pub fn parse_bounds_csv(raw: &str) -> Option<Bounds> {
    let parts = raw
        .split(',')
        .map(|part| part.trim().parse::<i32>().ok())
        .collect::<Option<Vec<_>>>()?;
    match parts.as_slice() {
        [left, top, right, bottom] => Bounds::new(*left, *top, *right, *bottom),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(left: i32, top: i32, right: i32, bottom: i32) -> Bounds {
        Bounds::new(left, top, right, bottom).expect("valid rect")
    }

    #[test]
    fn intersects_is_symmetric() {
        let cases = [
            (rect(0, 0, 10, 10), rect(5, 5, 15, 15)),
            (rect(0, 0, 10, 10), rect(10, 0, 20, 10)),
            (rect(0, 0, 10, 10), rect(20, 20, 30, 30)),
            (rect(0, 0, 100, 100), rect(40, 40, 60, 60)),
            (rect(0, 0, 0, 0), rect(0, 0, 10, 10)),
        ];
        for (a, b) in cases {
            assert_eq!(intersects(&a, &b), intersects(&b, &a), "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn rect_intersects_itself_unless_degenerate() {
        let a = rect(3, 4, 30, 40);
        assert!(intersects(&a, &a));
        let flat = rect(3, 4, 30, 4);
        assert!(!intersects(&flat, &flat));
    }

    #[test]
    fn touching_edges_do_not_intersect() {
        assert!(!intersects(&rect(0, 0, 10, 10), &rect(10, 0, 20, 10)));
        assert!(!intersects(&rect(0, 0, 10, 10), &rect(0, 10, 10, 20)));
    }

    #[test]
    fn returns_center_without_blockers() {
        assert_eq!(find_clear_point(&rect(0, 0, 100, 100), &[]), Some((50, 50)));
    }

    #[test]
    fn fully_covered_target_has_no_clear_point() {
        let target = rect(0, 0, 100, 100);
        assert_eq!(find_clear_point(&target, &[rect(0, 0, 100, 100)]), None);
        assert_eq!(find_clear_point(&target, &[rect(-10, -10, 200, 200)]), None);
    }

    #[test]
    fn union_of_blockers_can_cover_target() {
        let target = rect(0, 0, 100, 100);
        let blockers = [rect(0, 0, 60, 100), rect(50, 0, 100, 100)];
        assert_eq!(find_clear_point(&target, &blockers), None);
    }

    #[test]
    fn steps_off_a_blocker_over_the_center() {
        let target = rect(0, 0, 100, 100);
        let point = find_clear_point(&target, &[rect(0, 0, 50, 100)]).expect("point");
        assert_eq!(point, (51, 50));
    }

    #[test]
    fn finds_narrow_gap_between_blockers() {
        let target = rect(0, 0, 1000, 1000);
        let blockers = [rect(0, 0, 700, 1000), rect(703, 0, 1000, 1000)];
        let (x, y) = find_clear_point(&target, &blockers).expect("gap");
        assert!(x > 700 && x < 703, "x={x}");
        assert!(y > 0 && y < 1000);
    }

    #[test]
    fn clear_point_stays_strictly_inside_and_outside_blockers() {
        let target = rect(100, 200, 400, 300);
        let blockers = [rect(150, 180, 350, 320), rect(90, 250, 160, 310)];
        let (x, y) = find_clear_point(&target, &blockers).expect("point");
        assert!(x > target.left && x < target.right);
        assert!(y > target.top && y < target.bottom);
        for b in &blockers {
            assert!(!covers(b, x, y));
        }
    }

    #[test]
    fn find_clear_point_is_deterministic() {
        let target = rect(0, 0, 300, 300);
        let blockers = [rect(100, 100, 200, 200), rect(0, 140, 300, 160)];
        let first = find_clear_point(&target, &blockers);
        for _ in 0..10 {
            assert_eq!(find_clear_point(&target, &blockers), first);
        }
        assert!(first.is_some());
    }

    #[test]
    fn too_thin_target_has_no_interior() {
        assert_eq!(find_clear_point(&rect(0, 0, 1, 100), &[]), None);
        assert_eq!(find_clear_point(&rect(0, 0, 0, 0), &[]), None);
    }

    #[test]
    fn extreme_target_and_blocker_edges_do_not_overflow() {
        let target = rect(0, 0, 400_000_000, 100);
        let point = find_clear_point(&target, &[rect(0, 0, 200_000_001, 100)]).expect("point");
        assert_eq!(point, (200_000_002, 50));

        let wide = rect(-2_000_000_000, 0, 2_000_000_000, 100);
        assert_eq!(find_clear_point(&wide, &[]), Some((0, 50)));
        let blocked = find_clear_point(&wide, &[rect(-10, 0, 10, 100)]).expect("point");
        assert_eq!(blocked, (-11, 50));
    }

    #[test]
    fn blockers_on_the_i32_limits_cover_everything() {
        let target = rect(i32::MIN, i32::MIN, i32::MAX, i32::MAX);
        let blocker = rect(i32::MIN, i32::MIN, i32::MAX, i32::MAX);
        assert_eq!(find_clear_point(&target, &[blocker]), None);
        assert_eq!(find_clear_point(&target, &[]), Some((-1, -1)));
    }

    #[test]
    fn parses_csv_bounds() {
        assert_eq!(parse_bounds_csv("10,20,30,40"), Some(rect(10, 20, 30, 40)));
        assert_eq!(parse_bounds_csv(" 1, 2, 3, 4 "), Some(rect(1, 2, 3, 4)));
        assert_eq!(parse_bounds_csv("10,20,thirty,40"), None);
        assert_eq!(parse_bounds_csv("10,20,30"), None);
        assert_eq!(parse_bounds_csv("30,20,10,40"), None);
        assert_eq!(parse_bounds_csv(""), None);
    }
}
