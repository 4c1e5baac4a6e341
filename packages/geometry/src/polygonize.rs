//! Raster to polygon conversion.
//!
//! Cells are grouped into 4-connected components of equal value. Each
//! component's boundary is traced on the cell-corner lattice as directed
//! edges that keep the component on their left, so exterior rings come out
//! counter-clockwise and holes clockwise. Where two diagonal cells of the
//! same component meet at a corner the tracer turns right, which keeps
//! every ring simple and leaves holes as separate interior rings.

use std::collections::{BTreeMap, VecDeque};

use curve_number_models::{AttributeValue, Feature, Field, Raster, VectorLayer};
use geo::{Coord, LineString, MultiPolygon, Polygon, coord};

const UNLABELED: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    East,
    North,
    West,
    South,
}

impl Direction {
    const fn turn_right(self) -> Self {
        match self {
            Self::East => Self::South,
            Self::South => Self::West,
            Self::West => Self::North,
            Self::North => Self::East,
        }
    }

    const fn turn_left(self) -> Self {
        match self {
            Self::East => Self::North,
            Self::North => Self::West,
            Self::West => Self::South,
            Self::South => Self::East,
        }
    }
}

/// Lattice vertex: `(column, rows-from-bottom)`.
type Vertex = (usize, usize);

#[derive(Debug, Clone, Copy)]
struct Edge {
    from: Vertex,
    dir: Direction,
}

impl Edge {
    const fn to(self) -> Vertex {
        let (x, y) = self.from;
        match self.dir {
            Direction::East => (x + 1, y),
            Direction::North => (x, y + 1),
            Direction::West => (x - 1, y),
            Direction::South => (x, y - 1),
        }
    }
}

struct Component {
    value: f64,
    cells: Vec<usize>,
}

/// Converts a raster into one polygon feature per 4-connected region of
/// equal value. No-data cells produce no features.
///
/// The output layer has a single real field named `field` holding the
/// region's cell value, and shares the raster's CRS.
#[must_use]
pub fn polygonize(raster: &Raster, field: &str) -> VectorLayer {
    let mut layer = VectorLayer::new(raster.crs, vec![Field::real(field)]);
    let (labels, components) = label_components(raster);

    for (id, component) in components.iter().enumerate() {
        let edges = boundary_edges(raster, &labels, id, &component.cells);
        let rings = trace_rings(&edges);
        let geometry = assemble(raster, rings);
        if geometry.0.is_empty() {
            continue;
        }
        layer.push(Feature {
            geometry,
            attributes: vec![AttributeValue::Real(component.value)],
        });
    }

    log::debug!(
        "Polygonized {}x{} raster into {} features",
        raster.width,
        raster.height,
        layer.len()
    );

    layer
}

#[allow(clippy::float_cmp)]
fn label_components(raster: &Raster) -> (Vec<usize>, Vec<Component>) {
    let (width, height) = (raster.width, raster.height);
    let mut labels = vec![UNLABELED; raster.data.len()];
    let mut components = Vec::new();
    let mut queue = VecDeque::new();

    for seed in 0..raster.data.len() {
        let value = raster.data[seed];
        if labels[seed] != UNLABELED || raster.is_no_data(value) {
            continue;
        }

        let id = components.len();
        let mut cells = Vec::new();
        labels[seed] = id;
        queue.push_back(seed);

        while let Some(cell) = queue.pop_front() {
            cells.push(cell);
            let (row, col) = (cell / width, cell % width);
            let neighbors = [
                cell.checked_sub(width),
                (row + 1 < height).then(|| cell + width),
                (col > 0).then(|| cell - 1),
                (col + 1 < width).then(|| cell + 1),
            ];
            for n in neighbors.into_iter().flatten() {
                if labels[n] == UNLABELED && raster.data[n] == value {
                    labels[n] = id;
                    queue.push_back(n);
                }
            }
        }

        components.push(Component { value, cells });
    }

    (labels, components)
}

fn boundary_edges(raster: &Raster, labels: &[usize], id: usize, cells: &[usize]) -> Vec<Edge> {
    let (width, height) = (raster.width, raster.height);
    let same = |n: Option<usize>| n.is_some_and(|n| labels[n] == id);
    let mut edges = Vec::with_capacity(cells.len() * 2);

    for &cell in cells {
        let (row, col) = (cell / width, cell % width);
        let bottom = height - row - 1;
        let top = height - row;

        if !same((row + 1 < height).then(|| cell + width)) {
            edges.push(Edge {
                from: (col, bottom),
                dir: Direction::East,
            });
        }
        if !same((col + 1 < width).then(|| cell + 1)) {
            edges.push(Edge {
                from: (col + 1, bottom),
                dir: Direction::North,
            });
        }
        if !same(cell.checked_sub(width)) {
            edges.push(Edge {
                from: (col + 1, top),
                dir: Direction::West,
            });
        }
        if !same((col > 0).then(|| cell - 1)) {
            edges.push(Edge {
                from: (col, top),
                dir: Direction::South,
            });
        }
    }

    edges
}

fn trace_rings(edges: &[Edge]) -> Vec<Vec<Vertex>> {
    let mut outgoing: BTreeMap<Vertex, Vec<usize>> = BTreeMap::new();
    for (idx, edge) in edges.iter().enumerate() {
        outgoing.entry(edge.from).or_default().push(idx);
    }

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();

    for start in 0..edges.len() {
        if used[start] {
            continue;
        }
        used[start] = true;
        let mut path = vec![start];
        let mut current = start;
        let mut closed = false;

        while let Some(next) = next_edge(edges, &outgoing, &used, current, start) {
            if next == start {
                closed = true;
                break;
            }
            used[next] = true;
            path.push(next);
            current = next;
        }

        if closed {
            rings.push(corners(edges, &path));
        } else {
            log::warn!("Discarding unclosed boundary ring of {} edges", path.len());
        }
    }

    rings
}

fn next_edge(
    edges: &[Edge],
    outgoing: &BTreeMap<Vertex, Vec<usize>>,
    used: &[bool],
    current: usize,
    start: usize,
) -> Option<usize> {
    let edge = edges[current];
    let candidates = outgoing.get(&edge.to())?;

    [edge.dir.turn_right(), edge.dir, edge.dir.turn_left()]
        .into_iter()
        .find_map(|dir| {
            candidates
                .iter()
                .copied()
                .find(|&idx| edges[idx].dir == dir && (idx == start || !used[idx]))
        })
}

/// Keeps only the vertices where the boundary changes direction.
fn corners(edges: &[Edge], path: &[usize]) -> Vec<Vertex> {
    let n = path.len();
    (0..n)
        .filter(|&i| edges[path[(i + n - 1) % n]].dir != edges[path[i]].dir)
        .map(|i| edges[path[i]].from)
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn signed_area(ring: &[Vertex]) -> f64 {
    let n = ring.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let (x0, y0) = ring[i];
            let (x1, y1) = ring[(i + 1) % n];
            (x0 as f64).mul_add(y1 as f64, -(x1 as f64 * y0 as f64))
        })
        .sum();
    twice / 2.0
}

#[allow(clippy::cast_precision_loss)]
fn to_world(raster: &Raster, (x, y): Vertex) -> Coord<f64> {
    let bottom = (raster.height as f64).mul_add(-raster.cell_height, raster.origin_y);
    coord! {
        x: (x as f64).mul_add(raster.cell_width, raster.origin_x),
        y: (y as f64).mul_add(raster.cell_height, bottom),
    }
}

fn to_line_string(raster: &Raster, ring: &[Vertex]) -> LineString<f64> {
    let mut coords: Vec<Coord<f64>> = ring.iter().map(|v| to_world(raster, *v)).collect();
    if let Some(first) = coords.first().copied() {
        coords.push(first);
    }
    LineString::new(coords)
}

fn assemble(raster: &Raster, rings: Vec<Vec<Vertex>>) -> MultiPolygon<f64> {
    let (exteriors, holes): (Vec<_>, Vec<_>) = rings
        .into_iter()
        .filter(|r| r.len() >= 4)
        .partition(|r| signed_area(r) > 0.0);

    let mut interiors: Vec<Vec<LineString<f64>>> = vec![Vec::new(); exteriors.len()];
    for hole in holes {
        let owner = if exteriors.len() == 1 {
            Some(0)
        } else {
            enclosing_exterior(&exteriors, &hole)
        };
        match owner {
            Some(idx) => interiors[idx].push(to_line_string(raster, &hole)),
            None => log::warn!("Dropping hole ring with no enclosing exterior"),
        }
    }

    MultiPolygon::new(
        exteriors
            .iter()
            .zip(interiors)
            .map(|(exterior, holes)| Polygon::new(to_line_string(raster, exterior), holes))
            .collect(),
    )
}

fn enclosing_exterior(exteriors: &[Vec<Vertex>], hole: &[Vertex]) -> Option<usize> {
    let bounds = |ring: &[Vertex]| {
        ring.iter().fold(
            (usize::MAX, usize::MAX, 0, 0),
            |(x0, y0, x1, y1), &(x, y)| (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        )
    };
    let (hx0, hy0, hx1, hy1) = bounds(hole);

    exteriors
        .iter()
        .enumerate()
        .filter(|(_, ring)| {
            let (x0, y0, x1, y1) = bounds(ring);
            x0 <= hx0 && y0 <= hy0 && x1 >= hx1 && y1 >= hy1
        })
        .min_by(|(_, a), (_, b)| signed_area(a).total_cmp(&signed_area(b)))
        .map(|(idx, _)| idx)
}
