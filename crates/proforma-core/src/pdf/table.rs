//! Ruled-line table detection.
//!
//! Cell boundaries come only from painted lines and rectangle edges, never
//! from text alignment. Edges are snapped and joined, their intersections
//! become grid points, the smallest edge-connected rectangles become cells,
//! and cells sharing corners form a table.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::content::{Char, PageContent, Segment, chars_to_text};

/// Segments closer to axis-aligned than this are treated as straight.
const ORIENTATION_EPSILON: f64 = 0.5;

/// Tolerances for ruled-line table detection, in points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableSettings {
    /// Parallel edges this close are moved onto a common line.
    pub snap_tolerance: f64,

    /// Collinear edges separated by at most this gap are merged.
    pub join_tolerance: f64,

    /// How far an edge may fall short of another and still intersect it.
    pub intersection_tolerance: f64,

    /// Edges shorter than this are ignored.
    pub edge_min_length: f64,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            snap_tolerance: 3.0,
            join_tolerance: 3.0,
            intersection_tolerance: 3.0,
            edge_min_length: 3.0,
        }
    }
}

/// A table as rows of cells. `None` marks a grid slot covered by a spanning
/// cell; an existing cell without text is the empty string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    rows: Vec<Vec<Option<String>>>,
}

impl Table {
    /// Build a table from already extracted rows.
    pub fn from_rows(rows: Vec<Vec<Option<String>>>) -> Self {
        Self { rows }
    }

    /// Rows in top to bottom order.
    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }
}

/// Axis-aligned cell rectangle (`top` grows downward).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellBox {
    pub x0: f64,
    pub top: f64,
    pub x1: f64,
    pub bottom: f64,
}

impl CellBox {
    fn contains(&self, c: &Char) -> bool {
        let (x, y) = c.midpoint();
        x >= self.x0 && x < self.x1 && y >= self.top && y < self.bottom
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Orientation {
    Horizontal,
    Vertical,
}

/// A straight ruling line. For horizontal edges `pos` is the `top`
/// coordinate and `start..end` spans x; for vertical edges `pos` is x and
/// `start..end` spans `top`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Edge {
    orientation: Orientation,
    pos: f64,
    start: f64,
    end: f64,
}

impl Edge {
    fn from_segment(s: &Segment) -> Option<Self> {
        if (s.top0 - s.top1).abs() <= ORIENTATION_EPSILON {
            Some(Self {
                orientation: Orientation::Horizontal,
                pos: (s.top0 + s.top1) / 2.0,
                start: s.x0.min(s.x1),
                end: s.x0.max(s.x1),
            })
        } else if (s.x0 - s.x1).abs() <= ORIENTATION_EPSILON {
            Some(Self {
                orientation: Orientation::Vertical,
                pos: (s.x0 + s.x1) / 2.0,
                start: s.top0.min(s.top1),
                end: s.top0.max(s.top1),
            })
        } else {
            None
        }
    }

    fn length(&self) -> f64 {
        self.end - self.start
    }
}

/// Grid point key; snapped coordinates are exact so bit patterns compare.
type PointKey = (u64, u64);

fn key(x: f64, top: f64) -> PointKey {
    // Adding zero folds -0.0 into 0.0.
    ((x + 0.0).to_bits(), (top + 0.0).to_bits())
}

#[derive(Debug, Clone, Default)]
struct Intersection {
    x: f64,
    top: f64,
    horizontal: HashSet<usize>,
    vertical: HashSet<usize>,
}

/// Finds the ruled table on a page.
pub struct TableFinder<'a> {
    settings: &'a TableSettings,
}

impl<'a> TableFinder<'a> {
    pub fn new(settings: &'a TableSettings) -> Self {
        Self { settings }
    }

    /// Extract the largest table on the page, if any.
    pub fn extract(&self, page: &PageContent) -> Option<Table> {
        let edges = self.edges(&page.segments);
        let intersections = self.intersections(&edges);
        let cells = cells_from_intersections(&intersections);
        if cells.is_empty() {
            trace!("No ruled cells among {} edges", edges.len());
            return None;
        }

        let tables = group_cells(cells);
        let largest = tables
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| a.len().cmp(&b.len()).then(ib.cmp(ia)))
            .map(|(_, cells)| cells)?;

        debug!(
            "Found {} ruled tables, using one with {} cells",
            tables.len(),
            largest.len()
        );

        let rows = rows_from_cells(largest, &page.chars);
        Some(Table::from_rows(rows))
    }

    fn edges(&self, segments: &[Segment]) -> Vec<Edge> {
        let (horizontal, vertical): (Vec<Edge>, Vec<Edge>) = segments
            .iter()
            .filter_map(Edge::from_segment)
            .partition(|e| e.orientation == Orientation::Horizontal);

        let mut edges = self.snap_and_join(horizontal);
        edges.extend(self.snap_and_join(vertical));
        edges.retain(|e| e.length() >= self.settings.edge_min_length);
        edges
    }

    /// Cluster parallel edges by position, move each cluster to its mean,
    /// then merge overlapping or nearly touching edges within the cluster.
    fn snap_and_join(&self, mut edges: Vec<Edge>) -> Vec<Edge> {
        edges.sort_by(|a, b| a.pos.total_cmp(&b.pos));

        let mut clusters: Vec<Vec<Edge>> = Vec::new();
        for edge in edges {
            match clusters.last_mut() {
                Some(cluster)
                    if cluster
                        .last()
                        .is_some_and(|last| edge.pos - last.pos <= self.settings.snap_tolerance) =>
                {
                    cluster.push(edge)
                }
                _ => clusters.push(vec![edge]),
            }
        }

        let mut joined = Vec::new();
        for mut cluster in clusters {
            let mean = cluster.iter().map(|e| e.pos).sum::<f64>() / cluster.len() as f64;
            cluster.sort_by(|a, b| a.start.total_cmp(&b.start));

            let mut current: Option<Edge> = None;
            for edge in cluster {
                let edge = Edge { pos: mean, ..edge };
                current = match current {
                    Some(mut cur) if edge.start <= cur.end + self.settings.join_tolerance => {
                        cur.end = cur.end.max(edge.end);
                        Some(cur)
                    }
                    Some(cur) => {
                        joined.push(cur);
                        Some(edge)
                    }
                    None => Some(edge),
                };
            }
            joined.extend(current);
        }
        joined
    }

    fn intersections(&self, edges: &[Edge]) -> HashMap<PointKey, Intersection> {
        let tol = self.settings.intersection_tolerance;
        let mut points: HashMap<PointKey, Intersection> = HashMap::new();

        for (vi, v) in edges.iter().enumerate() {
            if v.orientation != Orientation::Vertical {
                continue;
            }
            for (hi, h) in edges.iter().enumerate() {
                if h.orientation != Orientation::Horizontal {
                    continue;
                }
                let crosses = v.start - tol <= h.pos
                    && h.pos <= v.end + tol
                    && h.start - tol <= v.pos
                    && v.pos <= h.end + tol;
                if crosses {
                    let point = points.entry(key(v.pos, h.pos)).or_insert_with(|| Intersection {
                        x: v.pos,
                        top: h.pos,
                        ..Default::default()
                    });
                    point.vertical.insert(vi);
                    point.horizontal.insert(hi);
                }
            }
        }
        points
    }
}

fn connected(a: &Intersection, b: &Intersection) -> bool {
    if a.x == b.x {
        !a.vertical.is_disjoint(&b.vertical)
    } else if a.top == b.top {
        !a.horizontal.is_disjoint(&b.horizontal)
    } else {
        false
    }
}

/// For each grid point take the nearest point below and to the right that
/// close a rectangle whose four sides are all ruled.
fn cells_from_intersections(intersections: &HashMap<PointKey, Intersection>) -> Vec<CellBox> {
    let mut points: Vec<&Intersection> = intersections.values().collect();
    points.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.top.total_cmp(&b.top)));

    let mut cells = Vec::new();
    for (i, pt) in points.iter().enumerate() {
        let rest = &points[i + 1..];
        let below = rest.iter().filter(|p| p.x == pt.x);
        let right: Vec<&&Intersection> = rest.iter().filter(|p| p.top == pt.top).collect();

        'below: for below_pt in below {
            if !connected(pt, below_pt) {
                continue;
            }
            for right_pt in &right {
                if !connected(pt, right_pt) {
                    continue;
                }
                let Some(corner) = intersections.get(&key(right_pt.x, below_pt.top)) else {
                    continue;
                };
                if connected(corner, right_pt) && connected(corner, below_pt) {
                    cells.push(CellBox {
                        x0: pt.x,
                        top: pt.top,
                        x1: corner.x,
                        bottom: corner.top,
                    });
                    break 'below;
                }
            }
        }
    }
    cells
}

/// Group cells that share at least one corner. Groups come back ordered by
/// their top-left cell.
fn group_cells(cells: Vec<CellBox>) -> Vec<Vec<CellBox>> {
    let corners = |c: &CellBox| {
        [
            key(c.x0, c.top),
            key(c.x1, c.top),
            key(c.x0, c.bottom),
            key(c.x1, c.bottom),
        ]
    };

    let mut by_corner: HashMap<PointKey, Vec<usize>> = HashMap::new();
    for (i, cell) in cells.iter().enumerate() {
        for corner in corners(cell) {
            by_corner.entry(corner).or_default().push(i);
        }
    }

    let mut seen = vec![false; cells.len()];
    let mut tables = Vec::new();
    for start in 0..cells.len() {
        if seen[start] {
            continue;
        }
        seen[start] = true;

        let mut group = Vec::new();
        let mut queue = VecDeque::from([start]);
        while let Some(i) = queue.pop_front() {
            group.push(cells[i]);
            for corner in corners(&cells[i]) {
                for &j in &by_corner[&corner] {
                    if !seen[j] {
                        seen[j] = true;
                        queue.push_back(j);
                    }
                }
            }
        }
        tables.push(group);
    }

    let top_left = |group: &Vec<CellBox>| {
        group
            .iter()
            .map(|c| (c.top, c.x0))
            .fold((f64::INFINITY, f64::INFINITY), |acc, p| {
                if p.0 < acc.0 || (p.0 == acc.0 && p.1 < acc.1) { p } else { acc }
            })
    };
    tables.sort_by(|a, b| {
        let (ta, la) = top_left(a);
        let (tb, lb) = top_left(b);
        ta.total_cmp(&tb).then(la.total_cmp(&lb))
    });
    tables
}

/// Lay cells out on a grid: one row per distinct `top`, one column per
/// distinct left edge.
fn rows_from_cells(cells: &[CellBox], chars: &[Char]) -> Vec<Vec<Option<String>>> {
    let mut columns: Vec<f64> = cells.iter().map(|c| c.x0).collect();
    columns.sort_by(f64::total_cmp);
    columns.dedup();

    let mut sorted: Vec<&CellBox> = cells.iter().collect();
    sorted.sort_by(|a, b| a.top.total_cmp(&b.top).then(a.x0.total_cmp(&b.x0)));

    let mut rows: Vec<Vec<Option<String>>> = Vec::new();
    let mut current_top: Option<f64> = None;
    for cell in sorted {
        if current_top != Some(cell.top) {
            rows.push(vec![None; columns.len()]);
            current_top = Some(cell.top);
        }
        let Some(row) = rows.last_mut() else {
            continue;
        };
        if let Some(col) = columns.iter().position(|x| *x == cell.x0) {
            row[col] = Some(chars_to_text(chars.iter().filter(|c| cell.contains(c))));
        }
    }
    rows
}
