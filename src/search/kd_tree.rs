use kiddo::{KdTree, SquaredEuclidean};

use crate::cell::UnitCell;
use crate::errors::Error;
use crate::types::Vector3D;

use super::{collect_pairs, CutoffInterval, PairList, PairSearch};

/// kd-tree search: the searched points are indexed in a kd-tree, together
/// with the periodic images of the points close to a cell face, and
/// neighbors come from fixed-radius queries around each reference point.
///
/// The tree reports candidates up to a slightly larger radius than the
/// cutoff; every candidate is confirmed against the minimum image distance,
/// so the result is exact. The image construction requires the cutoff to be
/// at most half of the smallest distance between cell faces.
pub struct Tree;

impl PairSearch for Tree {
    fn paired(
        &self,
        reference: &[Vector3D],
        configuration: &[Vector3D],
        cell: &UnitCell,
        interval: CutoffInterval,
        return_distances: bool,
    ) -> Result<PairList, Error> {
        if reference.is_empty() || configuration.is_empty() {
            return Ok(collect_pairs(Vec::new(), return_distances));
        }

        let tree = PeriodicTree::new(configuration, cell, interval.max_cutoff)?;

        let mut entries = Vec::new();
        for (i, &position) in reference.iter().enumerate() {
            tree.for_each_neighbor(position, |j| {
                let distance = cell.distance(position, configuration[j]);
                if interval.contains(distance) {
                    entries.push((i, j, distance));
                }
            });
        }

        return Ok(collect_pairs(entries, return_distances));
    }

    fn self_paired(
        &self,
        reference: &[Vector3D],
        cell: &UnitCell,
        interval: CutoffInterval,
        return_distances: bool,
    ) -> Result<PairList, Error> {
        if reference.is_empty() {
            return Ok(collect_pairs(Vec::new(), return_distances));
        }

        let tree = PeriodicTree::new(reference, cell, interval.max_cutoff)?;

        let mut entries = Vec::new();
        for (i, &position) in reference.iter().enumerate() {
            tree.for_each_neighbor(position, |j| {
                if j <= i {
                    return;
                }

                let distance = cell.distance(position, reference[j]);
                if interval.contains(distance) {
                    entries.push((i, j, distance));
                }
            });
        }

        return Ok(collect_pairs(entries, return_distances));
    }
}

/// A kd-tree over points wrapped inside the unit cell, augmented with the
/// periodic images of the points within `cutoff` of a cell face. Each image
/// carries the index of the original point.
#[derive(Debug)]
struct PeriodicTree {
    tree: KdTree<f64, 3>,
    cell: UnitCell,
    cutoff: f64,
}

impl PeriodicTree {
    /// Index `points` for fixed-radius queries up to `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns an error for periodic cells when `cutoff` is larger than half
    /// of the smallest distance between faces: points further apart could be
    /// neighbors through an image this tree does not contain.
    #[time_graph::instrument(name = "PeriodicTree")]
    fn new(points: &[Vector3D], cell: &UnitCell, cutoff: f64) -> Result<PeriodicTree, Error> {
        let mut tree = KdTree::with_capacity(points.len());

        if cell.is_infinite() {
            for (index, &position) in points.iter().enumerate() {
                tree.add(&[position[0], position[1], position[2]], index as u64);
            }

            return Ok(PeriodicTree {
                tree: tree,
                cell: *cell,
                cutoff: cutoff,
            });
        }

        let faces = cell.distances_between_faces();
        let smallest = f64::min(faces[0], f64::min(faces[1], faces[2]));
        if cutoff > smallest / 2.0 {
            return Err(Error::InvalidParameter(format!(
                "the maximal cutoff for a tree search in this cell is {}, got {}",
                smallest / 2.0, cutoff
            )));
        }

        let matrix = cell.matrix();
        for (index, &position) in points.iter().enumerate() {
            let mut wrapped = position;
            cell.wrap_vector(&mut wrapped);
            tree.add(&[wrapped[0], wrapped[1], wrapped[2]], index as u64);

            // a point at a perpendicular distance below the cutoff from a
            // face has an image through that face within the cutoff of
            // points inside the cell; the shifts can combine at corners
            let fractional = cell.fractional(wrapped);
            let mut shifts = [[0, 0]; 3];
            let mut n_shifts = [1usize; 3];
            for k in 0..3 {
                if fractional[k] * faces[k] < cutoff {
                    shifts[k][1] = 1;
                    n_shifts[k] = 2;
                } else if (1.0 - fractional[k]) * faces[k] < cutoff {
                    shifts[k][1] = -1;
                    n_shifts[k] = 2;
                }
            }

            for &shift_a in &shifts[0][..n_shifts[0]] {
                for &shift_b in &shifts[1][..n_shifts[1]] {
                    for &shift_c in &shifts[2][..n_shifts[2]] {
                        if shift_a == 0 && shift_b == 0 && shift_c == 0 {
                            continue;
                        }

                        let image = wrapped
                            + f64::from(shift_a) * Vector3D::from(matrix[0])
                            + f64::from(shift_b) * Vector3D::from(matrix[1])
                            + f64::from(shift_c) * Vector3D::from(matrix[2]);
                        tree.add(&[image[0], image[1], image[2]], index as u64);
                    }
                }
            }
        }

        return Ok(PeriodicTree {
            tree: tree,
            cell: *cell,
            cutoff: cutoff,
        });
    }

    /// Pass the index of every point with an image within the cutoff of
    /// `position` to `neighbor`, exactly once per original point
    fn for_each_neighbor(&self, position: Vector3D, mut neighbor: impl FnMut(usize)) {
        let mut query = position;
        self.cell.wrap_vector(&mut query);

        // query slightly beyond the cutoff, the exact filtering happens on
        // the minimum image distance
        let radius = self.cutoff * (1.0 + 1e-9);
        let mut found = self.tree.within_unsorted::<SquaredEuclidean>(
            &[query[0], query[1], query[2]],
            radius * radius,
        );

        // a point and its images all resolve to the same index
        found.sort_unstable_by_key(|candidate| candidate.item);
        found.dedup_by_key(|candidate| candidate.item);

        for candidate in found {
            neighbor(candidate.item as usize);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cutoff_limit() {
        let points = [Vector3D::new(1.0, 1.0, 1.0)];

        let error = PeriodicTree::new(&points, &UnitCell::cubic(10.0), 6.0).unwrap_err();
        assert_eq!(
            error.to_string(),
            "invalid parameter: the maximal cutoff for a tree search in this cell is 5, got 6"
        );

        assert!(PeriodicTree::new(&points, &UnitCell::cubic(10.0), 5.0).is_ok());
        // without a cell there is no image construction, and no limit
        assert!(PeriodicTree::new(&points, &UnitCell::infinite(), 1e6).is_ok());
    }

    #[test]
    fn neighbors_through_boundary() {
        let cell = UnitCell::cubic(10.0);
        let points = [
            Vector3D::new(0.5, 5.0, 5.0),
            Vector3D::new(9.75, 5.0, 5.0),
            Vector3D::new(5.0, 5.0, 5.0),
        ];

        let interval = CutoffInterval { max_cutoff: 1.0, min_cutoff: None };
        let result = Tree.self_paired(&points, &cell, interval, true).unwrap();
        assert_eq!(result.pairs, [[0, 1]]);
        assert_eq!(result.distances.unwrap(), [0.75]);

        // the same pair is excluded by a lower bound at its distance
        let interval = CutoffInterval { max_cutoff: 1.0, min_cutoff: Some(0.75) };
        let result = Tree.self_paired(&points, &cell, interval, true).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn images_are_reported_once() {
        let cell = UnitCell::cubic(10.0);
        let reference = [Vector3D::new(9.0, 5.0, 5.0), Vector3D::new(1.0, 5.0, 5.0)];
        // this point gets an image at (10.5, 5, 5), within the query radius
        // of the first reference point
        let configuration = [Vector3D::new(0.5, 5.0, 5.0)];

        let interval = CutoffInterval { max_cutoff: 4.9, min_cutoff: None };
        let result = Tree.paired(&reference, &configuration, &cell, interval, true).unwrap();
        assert_eq!(result.pairs, [[0, 0], [1, 0]]);
        assert_eq!(result.distances.unwrap(), [1.5, 0.5]);
    }

    #[test]
    fn corner_images() {
        let cell = UnitCell::cubic(10.0);
        let points = [
            Vector3D::new(0.25, 0.25, 0.25),
            Vector3D::new(9.75, 9.75, 9.75),
        ];

        // closest through the cell corner: (9.75, 9.75, 9.75) has an image
        // at (-0.25, -0.25, -0.25)
        let interval = CutoffInterval { max_cutoff: 1.0, min_cutoff: None };
        let result = Tree.self_paired(&points, &cell, interval, true).unwrap();
        assert_eq!(result.pairs, [[0, 1]]);
        assert_eq!(result.distances.unwrap(), [f64::sqrt(3.0 * 0.25)]);
    }

    #[test]
    fn triclinic_cell() {
        let cell = UnitCell::triclinic(10.0, 10.0, 10.0, 90.0, 90.0, 60.0);
        let points = [
            Vector3D::new(0.5, 0.5, 0.5),
            Vector3D::new(9.5, 0.5, 0.5),
        ];

        // (9.5, 0.5, 0.5) is one a vector away from (-0.5, 0.5, 0.5), at
        // distance 1 from the first point through the boundary
        let interval = CutoffInterval { max_cutoff: 1.5, min_cutoff: None };
        let result = Tree.self_paired(&points, &cell, interval, true).unwrap();
        assert_eq!(result.pairs, [[0, 1]]);
        assert_eq!(result.distances.unwrap(), [cell.distance(points[0], points[1])]);
    }

    #[test]
    fn without_cell() {
        let cell = UnitCell::infinite();
        let points = [
            Vector3D::new(0.0, 0.0, 0.0),
            Vector3D::new(9.0, 0.0, 0.0),
        ];

        let interval = CutoffInterval { max_cutoff: 2.0, min_cutoff: None };
        let result = Tree.self_paired(&points, &cell, interval, true).unwrap();
        assert!(result.is_empty());

        let interval = CutoffInterval { max_cutoff: 10.0, min_cutoff: None };
        let result = Tree.self_paired(&points, &cell, interval, true).unwrap();
        assert_eq!(result.pairs, [[0, 1]]);
        assert_eq!(result.distances.unwrap(), [9.0]);
    }
}
