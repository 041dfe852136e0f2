//! Iso-valued contours using the marching squares algorithm.
//!
//! Vertices are `(row, col)` positions linearly interpolated along the edges
//! of each 2x2 cell. Ambiguous saddle cells keep the low-valued corners
//! connected, so two high pixels touching only at a corner produce two
//! separate outlines. A closed contour repeats its first vertex at the end.

use crate::reproject::{isolate_label, unique_labels};
use ndarray::Array2;
use std::collections::HashMap;

/// Level used to trace the boundary of a 0/1 image.
pub const BINARY_LEVEL: f64 = 0.5;

/// One polyline in `(row, col)` coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub points: Vec<[f64; 2]>,
    pub closed: bool,
}

impl Contour {
    /// Vertices as `(x, y)` = `(col, row)` for plotting.
    pub fn xy(&self) -> Vec<(f64, f64)> {
        self.points.iter().map(|p| (p[1], p[0])).collect()
    }
}

/// Cell edge identity: horizontal edges join `(r, c)`-`(r, c+1)`, vertical
/// edges join `(r, c)`-`(r+1, c)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Edge {
    H(usize, usize),
    V(usize, usize),
}

/// Trace every contour of `data` at `level`. Cells with a NaN corner are
/// skipped.
pub fn find_contours(data: &Array2<f64>, level: f64) -> Vec<Contour> {
    let (rows, cols) = data.dim();
    if rows < 2 || cols < 2 {
        return Vec::new();
    }

    let mut points: HashMap<Edge, [f64; 2]> = HashMap::new();
    let mut segments: Vec<(Edge, Edge)> = Vec::new();

    for r in 0..rows - 1 {
        for c in 0..cols - 1 {
            let ul = data[[r, c]];
            let ur = data[[r, c + 1]];
            let ll = data[[r + 1, c]];
            let lr = data[[r + 1, c + 1]];
            if ul.is_nan() || ur.is_nan() || ll.is_nan() || lr.is_nan() {
                continue;
            }

            let mut case = 0u8;
            if ul > level { case |= 1; }
            if ur > level { case |= 2; }
            if ll > level { case |= 4; }
            if lr > level { case |= 8; }
            if case == 0 || case == 15 {
                continue;
            }

            let top = Edge::H(r, c);
            let bottom = Edge::H(r + 1, c);
            let left = Edge::V(r, c);
            let right = Edge::V(r, c + 1);

            let pairs: &[(Edge, Edge)] = match case {
                1 | 14 => &[(top, left)],
                2 | 13 => &[(top, right)],
                3 | 12 => &[(left, right)],
                4 | 11 => &[(left, bottom)],
                5 | 10 => &[(top, bottom)],
                7 | 8 => &[(right, bottom)],
                6 => &[(top, right), (left, bottom)],
                9 => &[(top, left), (right, bottom)],
                _ => &[],
            };

            for &(a, b) in pairs {
                for edge in [a, b] {
                    points.entry(edge).or_insert_with(|| match edge {
                        Edge::H(er, ec) => {
                            let t = crossing(data[[er, ec]], data[[er, ec + 1]], level);
                            [er as f64, ec as f64 + t]
                        }
                        Edge::V(er, ec) => {
                            let t = crossing(data[[er, ec]], data[[er + 1, ec]], level);
                            [er as f64 + t, ec as f64]
                        }
                    });
                }
                segments.push((a, b));
            }
        }
    }

    assemble(&segments, &points)
}

/// Outline every distinct label of a label image, in ascending label order.
pub fn label_contours(labels: &Array2<f64>) -> Vec<Contour> {
    unique_labels(labels)
        .into_iter()
        .flat_map(|label| find_contours(&isolate_label(labels, label), BINARY_LEVEL))
        .collect()
}

fn crossing(v0: f64, v1: f64, level: f64) -> f64 {
    if v1 == v0 {
        0.5
    } else {
        ((level - v0) / (v1 - v0)).clamp(0.0, 1.0)
    }
}

/// Join segments sharing an edge into polylines. Open chains are traced
/// from their free ends first, the remaining segments form closed rings.
fn assemble(segments: &[(Edge, Edge)], points: &HashMap<Edge, [f64; 2]>) -> Vec<Contour> {
    let mut incident: HashMap<Edge, Vec<usize>> = HashMap::new();
    for (i, &(a, b)) in segments.iter().enumerate() {
        incident.entry(a).or_default().push(i);
        incident.entry(b).or_default().push(i);
    }

    let mut used = vec![false; segments.len()];
    let mut contours = Vec::new();

    let mut starts: Vec<(Edge, usize)> = Vec::new();
    for (i, &(a, b)) in segments.iter().enumerate() {
        for edge in [a, b] {
            if incident.get(&edge).map_or(0, Vec::len) == 1 {
                starts.push((edge, i));
            }
        }
    }
    let rings = (0..segments.len()).map(|i| (segments[i].0, i));

    for (start, first) in starts.into_iter().chain(rings) {
        if used[first] {
            continue;
        }
        let mut chain = vec![start];
        let mut current = start;
        let mut seg = first;
        loop {
            used[seg] = true;
            let (a, b) = segments[seg];
            let next = if a == current { b } else { a };
            chain.push(next);
            current = next;
            match incident
                .get(&next)
                .and_then(|ids| ids.iter().copied().find(|&j| !used[j]))
            {
                Some(j) => seg = j,
                None => break,
            }
        }
        let closed = chain.len() > 2 && chain.first() == chain.last();
        contours.push(Contour {
            points: chain.iter().map(|e| points[e]).collect(),
            closed,
        });
    }
    contours
}
