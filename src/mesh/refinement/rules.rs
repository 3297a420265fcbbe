//! Local refinement rules for simplices.
//!
//! A rule describes how a single cell is subdivided given which of its local edges are marked.
//! Children are expressed through [`LocalVertex`], i.e. in terms of the corners and edge
//! midpoints of the parent cell, so the tables are independent of any global numbering.
use crate::mesh::CellType;
use crate::Real;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, OPoint};
use serde::{Deserialize, Serialize};

/// A vertex of a child cell, expressed in terms of its parent cell.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocalVertex {
    /// Local vertex of the parent.
    Corner(usize),
    /// Midpoint of a local edge of the parent.
    Midpoint(usize),
}

use LocalVertex::{Corner, Midpoint};

/// Green refinement patterns. Only `Irregular2` applies to triangles.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IrregularRule {
    /// Three marked edges on one face: 4 children.
    Irregular1,
    /// One marked edge: 2 children.
    Irregular2,
    /// Two marked edges sharing a vertex: 3 children.
    Irregular3,
    /// Two marked opposite edges: 4 children.
    Irregular4,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefinementRule {
    Regular,
    Irregular(IrregularRule),
}

const INTERVAL_REGULAR: [&[LocalVertex]; 2] = [&[Corner(0), Midpoint(0)], &[Midpoint(0), Corner(1)]];

// Triangle edges: 0 = (1, 2), 1 = (0, 2), 2 = (0, 1)
const TRIANGLE_REGULAR: [&[LocalVertex]; 4] = [
    &[Corner(0), Midpoint(2), Midpoint(1)],
    &[Midpoint(2), Corner(1), Midpoint(0)],
    &[Midpoint(1), Midpoint(0), Corner(2)],
    &[Midpoint(0), Midpoint(1), Midpoint(2)],
];

// Tetrahedron edges: 0 = (2, 3), 1 = (1, 3), 2 = (1, 2), 3 = (0, 3), 4 = (0, 2), 5 = (0, 1).
// The interior octahedron is split along the diagonal between the midpoints of (0, 2) and (1, 3).
const TETRAHEDRON_REGULAR: [&[LocalVertex]; 8] = [
    &[Corner(0), Midpoint(5), Midpoint(4), Midpoint(3)],
    &[Midpoint(5), Corner(1), Midpoint(2), Midpoint(1)],
    &[Midpoint(4), Midpoint(2), Corner(2), Midpoint(0)],
    &[Midpoint(3), Midpoint(1), Midpoint(0), Corner(3)],
    &[Midpoint(5), Midpoint(4), Midpoint(3), Midpoint(1)],
    &[Midpoint(5), Midpoint(4), Midpoint(2), Midpoint(1)],
    &[Midpoint(4), Midpoint(3), Midpoint(1), Midpoint(0)],
    &[Midpoint(4), Midpoint(2), Midpoint(1), Midpoint(0)],
];

/// Children of the regular (red) rule: `2^d` cells spanned by corners and all edge midpoints.
pub fn regular_children(cell_type: CellType) -> &'static [&'static [LocalVertex]] {
    match cell_type {
        CellType::Interval => &INTERVAL_REGULAR,
        CellType::Triangle => &TRIANGLE_REGULAR,
        CellType::Tetrahedron => &TETRAHEDRON_REGULAR,
    }
}

fn marked_edges(cell_type: CellType, marked: &[bool]) -> Vec<[usize; 2]> {
    assert_eq!(marked.len(), cell_type.num_edges(), "Need one mark per local edge.");
    cell_type
        .local_edges()
        .iter()
        .zip(marked)
        .filter(|(_, is_marked)| **is_marked)
        .map(|(&edge, _)| edge)
        .collect()
}

fn share_vertex([a, b]: [usize; 2], [c, d]: [usize; 2]) -> bool {
    a == c || a == d || b == c || b == d
}

/// The local vertex not touched by any of the given edges, if there is exactly one such vertex
/// on a tetrahedron. For edges lying on one face, this is the vertex opposite that face.
fn untouched_vertex(edges: &[[usize; 2]]) -> Option<usize> {
    let mut untouched = (0..4).filter(|v| edges.iter().all(|edge| !edge.contains(v)));
    let vertex = untouched.next()?;
    untouched.next().is_none().then(|| vertex)
}

/// Returns `true` if all marked edges lie on a common face of the cell.
///
/// For triangles this holds whenever at least one edge is marked. For tetrahedra, a single edge
/// is trivially co-facial, two edges are co-facial if they share a vertex and three edges are
/// co-facial if they bound one face. Four or more marked edges never lie on one face.
pub fn marked_edges_on_same_face(cell_type: CellType, marked: &[bool]) -> bool {
    let edges = marked_edges(cell_type, marked);
    match cell_type {
        CellType::Interval | CellType::Triangle => !edges.is_empty(),
        CellType::Tetrahedron => match edges.len() {
            1 => true,
            2 => share_vertex(edges[0], edges[1]),
            3 => untouched_vertex(&edges).is_some(),
            _ => false,
        },
    }
}

/// Finds the rule matching the marked local edges of a cell, if any.
///
/// A cell with marked edges but no matching rule must be closed by promoting it to regular
/// refinement. Three marked edges of a tetrahedron that do not bound a face have no rule.
pub fn select_rule(cell_type: CellType, marked: &[bool]) -> Option<RefinementRule> {
    let num_marked = marked_edges(cell_type, marked).len();
    match cell_type {
        CellType::Interval => (num_marked == 1).then(|| RefinementRule::Regular),
        CellType::Triangle => match num_marked {
            3 => Some(RefinementRule::Regular),
            1 => Some(RefinementRule::Irregular(IrregularRule::Irregular2)),
            _ => None,
        },
        CellType::Tetrahedron => {
            let same_face = marked_edges_on_same_face(cell_type, marked);
            match num_marked {
                6 => Some(RefinementRule::Regular),
                3 if same_face => Some(RefinementRule::Irregular(IrregularRule::Irregular1)),
                1 => Some(RefinementRule::Irregular(IrregularRule::Irregular2)),
                2 if same_face => Some(RefinementRule::Irregular(IrregularRule::Irregular3)),
                2 => Some(RefinementRule::Irregular(IrregularRule::Irregular4)),
                _ => None,
            }
        }
    }
}

/// Number of children the rule produces.
pub fn num_children(cell_type: CellType, rule: RefinementRule) -> usize {
    match rule {
        RefinementRule::Regular => cell_type.num_regular_children(),
        RefinementRule::Irregular(IrregularRule::Irregular1) => 4,
        RefinementRule::Irregular(IrregularRule::Irregular2) => 2,
        RefinementRule::Irregular(IrregularRule::Irregular3) => 3,
        RefinementRule::Irregular(IrregularRule::Irregular4) => 4,
    }
}

fn lexicographically_less<T, D>(a: &OPoint<T, D>, b: &OPoint<T, D>) -> bool
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    for (x, y) in a.coords.iter().zip(b.coords.iter()) {
        if x < y {
            return true;
        } else if x > y {
            return false;
        }
    }
    false
}

fn midpoint(cell_type: CellType, a: usize, b: usize) -> LocalVertex {
    Midpoint(
        cell_type
            .local_edge_index(a, b)
            .expect("Vertex pair must be a local edge."),
    )
}

fn others(cell_type: CellType, exclude: &[usize]) -> Vec<usize> {
    (0..cell_type.num_vertices())
        .filter(|v| !exclude.contains(v))
        .collect()
}

/// Subdivides a cell according to `rule`.
///
/// `marked` holds the edge marks the rule was selected from and `points` the coordinates of the
/// cell's vertices, which are used to choose the diagonal of the quadrilateral in the
/// `Irregular3` pattern: the diagonal ends at the lexicographically smaller of the two vertices
/// not shared by the marked edges. Any cell sharing that face derives the same diagonal, so the
/// result is conforming.
///
/// # Panics
///
/// Panics if the marked edges do not match an irregular rule, which is a broken contract of the
/// caller.
pub fn subdivide<T, D>(
    cell_type: CellType,
    rule: RefinementRule,
    marked: &[bool],
    points: &[OPoint<T, D>],
) -> Vec<Vec<LocalVertex>>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let irregular = match rule {
        RefinementRule::Regular => {
            return regular_children(cell_type)
                .iter()
                .map(|child| child.to_vec())
                .collect()
        }
        RefinementRule::Irregular(irregular) => irregular,
    };

    assert_eq!(
        select_rule(cell_type, marked),
        Some(rule),
        "Marked edges {:?} of {:?} cell do not match rule {:?}.",
        marked,
        cell_type,
        rule
    );
    let edges = marked_edges(cell_type, marked);

    match (cell_type, irregular) {
        (CellType::Triangle, IrregularRule::Irregular2) => {
            let [n0, n1] = edges[0];
            let ne = midpoint(cell_type, n0, n1);
            let n2 = others(cell_type, &[n0, n1])[0];
            vec![vec![Corner(n0), ne, Corner(n2)], vec![ne, Corner(n1), Corner(n2)]]
        }
        (CellType::Tetrahedron, IrregularRule::Irregular1) => {
            let nn = untouched_vertex(&edges).expect("Marked edges must bound a face.");
            let rest = others(cell_type, &[nn]);
            let (n0, n1, n2) = (rest[0], rest[1], rest[2]);
            let (n01, n02, n12) = (
                midpoint(cell_type, n0, n1),
                midpoint(cell_type, n0, n2),
                midpoint(cell_type, n1, n2),
            );
            let nn = Corner(nn);
            vec![
                vec![nn, n01, n02, n12],
                vec![nn, n01, n02, Corner(n0)],
                vec![nn, n01, n12, Corner(n1)],
                vec![nn, n02, n12, Corner(n2)],
            ]
        }
        (CellType::Tetrahedron, IrregularRule::Irregular2) => {
            let [n0, n1] = edges[0];
            let ne = midpoint(cell_type, n0, n1);
            let rest = others(cell_type, &[n0, n1]);
            let (nn0, nn1) = (Corner(rest[0]), Corner(rest[1]));
            vec![vec![ne, nn0, nn1, Corner(n0)], vec![ne, nn0, nn1, Corner(n1)]]
        }
        (CellType::Tetrahedron, IrregularRule::Irregular3) => {
            let [a, b] = edges[0];
            let [c, d] = edges[1];
            let dm = if a == c || a == d { a } else { b };
            let m0 = if a == dm { b } else { a };
            let m1 = if c == dm { d } else { c };
            let nm = others(cell_type, &[dm, m0, m1])[0];
            let (e0, e1) = (midpoint(cell_type, dm, m0), midpoint(cell_type, dm, m1));
            let (dm, nm) = (Corner(dm), Corner(nm));
            let mut children = vec![vec![dm, e0, e1, nm]];
            if !lexicographically_less(&points[m1], &points[m0]) {
                // Diagonal from e1 to m0
                children.push(vec![Corner(m0), Corner(m1), e1, nm]);
                children.push(vec![e0, e1, Corner(m0), nm]);
            } else {
                // Diagonal from e0 to m1
                children.push(vec![e0, e1, Corner(m1), nm]);
                children.push(vec![Corner(m0), Corner(m1), e0, nm]);
            }
            children
        }
        (CellType::Tetrahedron, IrregularRule::Irregular4) => {
            let [a, b] = edges[0];
            let [c, d] = edges[1];
            assert!(!share_vertex(edges[0], edges[1]), "Irregular4 requires opposite edges.");
            let (e0, e1) = (midpoint(cell_type, a, b), midpoint(cell_type, c, d));
            vec![
                vec![e0, e1, Corner(a), Corner(c)],
                vec![e0, e1, Corner(a), Corner(d)],
                vec![e0, e1, Corner(b), Corner(c)],
                vec![e0, e1, Corner(b), Corner(d)],
            ]
        }
        (cell_type, irregular) => panic!("Rule {:?} does not apply to {:?} cells.", irregular, cell_type),
    }
}
