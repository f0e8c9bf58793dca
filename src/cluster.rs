//! Spatial clustering of detections into card names
//!
//! OCR often splits one printed name into several boxes. Boxes that sit on the
//! same line within a small horizontal gap are treated as adjacent, and every
//! connected component of the adjacency graph becomes one [`MergedCard`].
//! Components are computed with a union-find, so the result depends only on
//! geometry and never on input order.

use crate::config::PipelineConfig;
use crate::detection::{Detection, Extents, Point};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Adjacency tolerances in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjacency {
    pub vertical_tolerance: f64,
    pub horizontal_tolerance: f64,
}

impl Default for Adjacency {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for Adjacency {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            vertical_tolerance: config.vertical_adjacency_tolerance_px,
            horizontal_tolerance: config.horizontal_adjacency_tolerance_px,
        }
    }
}

impl Adjacency {
    /// Whether two boxes are fragments of the same label. Symmetric.
    pub fn adjacent(&self, a: &Extents, b: &Extents) -> bool {
        let tol_y = self.vertical_tolerance;
        let vertical_overlap = !(a.y_max < b.y_min - tol_y || b.y_max < a.y_min - tol_y);
        vertical_overlap && horizontal_gap(a, b) <= self.horizontal_tolerance
    }
}

/// Distance between the x-intervals of two boxes, zero when they overlap
pub fn horizontal_gap(a: &Extents, b: &Extents) -> f64 {
    (b.x_min - a.x_max).max(a.x_min - b.x_max).max(0.0)
}

/// One or more detections merged into a single candidate card name
#[derive(Debug, Clone, PartialEq)]
pub struct MergedCard {
    /// Constituent texts joined left to right with single spaces
    pub text: String,
    /// Mean of constituent confidences
    pub confidence: f32,
    /// Rectangle enclosing every constituent point
    pub bbox: Vec<Point>,
    /// Top edge of the topmost constituent
    pub y_position: f64,
    pub extents: Extents,
    pub fragments: usize,
}

/// Disjoint-set forest over detection indices, path compression plus union by rank
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, x: usize, y: usize) {
        let root_x = self.find(x);
        let root_y = self.find(y);
        if root_x == root_y {
            return;
        }
        match self.rank[root_x].cmp(&self.rank[root_y]) {
            Ordering::Greater => self.parent[root_y] = root_x,
            Ordering::Less => self.parent[root_x] = root_y,
            Ordering::Equal => {
                self.parent[root_y] = root_x;
                self.rank[root_x] += 1;
            }
        }
    }
}

/// Left-to-right reading order inside a group; later keys only break exact ties
fn reading_order(a: &Detection, b: &Detection) -> Ordering {
    let (ea, eb) = (a.extents(), b.extents());
    ea.x_min
        .total_cmp(&eb.x_min)
        .then_with(|| ea.y_min.total_cmp(&eb.y_min))
        .then_with(|| a.text().cmp(b.text()))
        .then_with(|| a.confidence().total_cmp(&b.confidence()))
}

/// Top-to-bottom presentation order across cards
fn presentation_order(a: &MergedCard, b: &MergedCard) -> Ordering {
    a.y_position
        .total_cmp(&b.y_position)
        .then_with(|| a.extents.x_min.total_cmp(&b.extents.x_min))
        .then_with(|| a.text.cmp(&b.text))
}

fn merge_group(mut group: Vec<&Detection>) -> MergedCard {
    group.sort_by(|a, b| reading_order(a, b));

    let text = group
        .iter()
        .map(|d| d.text())
        .collect::<Vec<_>>()
        .join(" ");

    let confidence =
        group.iter().map(|d| d.confidence()).sum::<f32>() / group.len() as f32;

    let points: Vec<Point> = group.iter().flat_map(|d| d.bbox().iter().copied()).collect();
    // Groups are never empty and every detection has at least four points
    let extents = Extents::of(&points).unwrap_or(*group[0].extents());

    MergedCard {
        text,
        confidence,
        bbox: extents.to_polygon(),
        y_position: extents.y_min,
        extents,
        fragments: group.len(),
    }
}

/// Group detections into cards and order them top to bottom
pub fn cluster(detections: &[Detection], adjacency: &Adjacency) -> Vec<MergedCard> {
    let mut sets = UnionFind::new(detections.len());

    for i in 0..detections.len() {
        for j in (i + 1)..detections.len() {
            if adjacency.adjacent(detections[i].extents(), detections[j].extents()) {
                sets.union(i, j);
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<&Detection>> = BTreeMap::new();
    for (i, det) in detections.iter().enumerate() {
        groups.entry(sets.find(i)).or_default().push(det);
    }

    let mut cards: Vec<MergedCard> = groups.into_values().map(merge_group).collect();
    cards.sort_by(presentation_order);

    tracing::debug!(
        "Clustered {} detections into {} cards",
        detections.len(),
        cards.len()
    );

    cards
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::test_support::rect;

    fn ext(x: f64, y: f64, w: f64, h: f64) -> Extents {
        *rect(x, y, w, h, "x", 1.0).extents()
    }

    #[test]
    fn test_adjacent_on_same_line_within_gap() {
        let adj = Adjacency::default();
        assert!(adj.adjacent(&ext(0.0, 0.0, 50.0, 20.0), &ext(80.0, 0.0, 40.0, 20.0)));
        assert!(!adj.adjacent(&ext(0.0, 0.0, 50.0, 20.0), &ext(81.0, 0.0, 40.0, 20.0)));
    }

    #[test]
    fn test_vertical_tolerance() {
        let adj = Adjacency::default();
        // b's top is 10px below a's bottom: still counts as overlapping
        assert!(adj.adjacent(&ext(0.0, 0.0, 50.0, 20.0), &ext(55.0, 30.0, 40.0, 20.0)));
        assert!(!adj.adjacent(&ext(0.0, 0.0, 50.0, 20.0), &ext(55.0, 31.0, 40.0, 20.0)));
    }

    #[test]
    fn test_overlapping_boxes_are_adjacent() {
        let adj = Adjacency::default();
        // Wide box fully containing a narrow one horizontally
        assert!(adj.adjacent(&ext(0.0, 0.0, 200.0, 20.0), &ext(80.0, 5.0, 20.0, 10.0)));
        assert_eq!(horizontal_gap(&ext(0.0, 0.0, 200.0, 20.0), &ext(80.0, 5.0, 20.0, 10.0)), 0.0);
    }

    #[test]
    fn test_adjacency_is_symmetric() {
        let adj = Adjacency {
            vertical_tolerance: 4.0,
            horizontal_tolerance: 12.0,
        };
        let boxes = [
            ext(0.0, 0.0, 30.0, 10.0),
            ext(40.0, 2.0, 30.0, 10.0),
            ext(42.0, 13.0, 10.0, 10.0),
            ext(-20.0, -14.0, 15.0, 10.0),
            ext(100.0, 0.0, 5.0, 5.0),
            ext(10.0, 50.0, 300.0, 30.0),
        ];
        for a in &boxes {
            for b in &boxes {
                assert_eq!(adj.adjacent(a, b), adj.adjacent(b, a), "{:?} vs {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_merges_split_name() {
        let dets = vec![
            rect(60.0, 12.0, 40.0, 20.0, "Bolt", 0.8),
            rect(0.0, 10.0, 50.0, 20.0, "Lightning", 0.9),
        ];
        let cards = cluster(&dets, &Adjacency::default());
        assert_eq!(cards.len(), 1);
        let card = &cards[0];
        assert_eq!(card.text, "Lightning Bolt");
        assert!((card.confidence - 0.85).abs() < 1e-6);
        assert_eq!(card.y_position, 10.0);
        assert_eq!(card.fragments, 2);
        assert_eq!(
            card.bbox,
            vec![
                Point::new(0.0, 10.0),
                Point::new(100.0, 10.0),
                Point::new(100.0, 32.0),
                Point::new(0.0, 32.0),
            ]
        );
    }

    #[test]
    fn test_transitive_chain_forms_one_group() {
        // a-b and b-c are adjacent, a-c are not
        let dets = vec![
            rect(0.0, 0.0, 20.0, 10.0, "Nicol", 0.9),
            rect(50.0, 0.0, 20.0, 10.0, "Bolas,", 0.9),
            rect(100.0, 0.0, 20.0, 10.0, "Planeswalker", 0.9),
        ];
        let adj = Adjacency::default();
        assert!(!adj.adjacent(dets[0].extents(), dets[2].extents()));
        let cards = cluster(&dets, &adj);
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].text, "Nicol Bolas, Planeswalker");
    }

    #[test]
    fn test_orders_cards_top_to_bottom() {
        let dets = vec![
            rect(0.0, 90.0, 80.0, 20.0, "Shock", 0.9),
            rect(0.0, 10.0, 80.0, 20.0, "Opt", 0.9),
            rect(0.0, 50.0, 80.0, 20.0, "Ponder", 0.9),
        ];
        let cards = cluster(&dets, &Adjacency::default());
        let texts: Vec<&str> = cards.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["Opt", "Ponder", "Shock"]);
    }

    #[test]
    fn test_single_detection_forms_own_group() {
        let cards = cluster(&[rect(5.0, 5.0, 10.0, 10.0, "Opt", 0.4)], &Adjacency::default());
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].text, "Opt");
        assert_eq!(cards[0].confidence, 0.4);
    }

    #[test]
    fn test_empty_input() {
        assert!(cluster(&[], &Adjacency::default()).is_empty());
    }

    #[test]
    fn test_every_detection_lands_in_exactly_one_card() {
        let dets = vec![
            rect(0.0, 0.0, 50.0, 20.0, "Lightning", 0.9),
            rect(60.0, 0.0, 40.0, 20.0, "Bolt", 0.9),
            rect(0.0, 100.0, 80.0, 20.0, "Counterspell", 0.9),
            rect(0.0, 200.0, 50.0, 20.0, "Brainstorm", 0.9),
            rect(300.0, 200.0, 50.0, 20.0, "Ponder", 0.9),
        ];
        let cards = cluster(&dets, &Adjacency::default());
        let total: usize = cards.iter().map(|c| c.fragments).sum();
        assert_eq!(total, dets.len());
        assert_eq!(cards.len(), 4);
    }

    #[test]
    fn test_result_is_independent_of_input_order() {
        let dets = vec![
            rect(0.0, 0.0, 50.0, 20.0, "Lightning", 0.9),
            rect(60.0, 2.0, 40.0, 20.0, "Bolt", 0.7),
            rect(0.0, 40.0, 60.0, 20.0, "Snapcaster", 0.8),
            rect(70.0, 40.0, 40.0, 20.0, "Mage", 0.6),
            rect(120.0, 40.0, 40.0, 20.0, "Mage", 0.6),
            rect(0.0, 80.0, 80.0, 20.0, "Counterspell", 0.95),
            rect(0.0, 80.0, 80.0, 20.0, "Counterspell", 0.95),
        ];
        let adj = Adjacency::default();
        let expected = cluster(&dets, &adj);

        let n = dets.len();
        for shift in 1..n {
            let mut rotated = dets.clone();
            rotated.rotate_left(shift);
            assert_eq!(cluster(&rotated, &adj), expected, "rotation {}", shift);
        }
        let mut reversed = dets.clone();
        reversed.reverse();
        assert_eq!(cluster(&reversed, &adj), expected);

        let mut swapped = dets.clone();
        swapped.swap(0, 3);
        swapped.swap(1, 5);
        assert_eq!(cluster(&swapped, &adj), expected);
    }

    #[test]
    fn test_union_find_groups() {
        let mut uf = UnionFind::new(6);
        uf.union(0, 1);
        uf.union(2, 3);
        uf.union(1, 3);
        assert_eq!(uf.find(0), uf.find(2));
        assert_ne!(uf.find(0), uf.find(4));
        assert_ne!(uf.find(4), uf.find(5));
    }
}
