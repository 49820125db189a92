use log::warn;
use ndarray::Array3;

use crate::cell::UnitCell;
use crate::errors::Error;
use crate::types::Vector3D;

use super::{collect_pairs, CutoffInterval, PairList, PairSearch};

/// Maximal number of cells in a cell list, prevents unbounded memory use
/// with a small unit cell and a large cutoff
const MAX_NUMBER_OF_CELLS: f64 = 1e5;

/// Cell list search: points are binned in a grid of cells at least as large
/// as the cutoff, and only the points binned around a query point are
/// candidates. Candidates are confirmed against the minimum image distance,
/// so the result is exact.
///
/// Without periodic boundary conditions, the binning uses a pseudo cell
/// built around the coordinates, and the search never wraps around its
/// boundaries.
pub struct Grid;

impl PairSearch for Grid {
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

        // the pseudo cell must enclose the queries as well as the binned
        // points, build it from both sets
        let mut cell_list = CellList::new(cell, interval.max_cutoff, &[reference, configuration]);
        for (j, &position) in configuration.iter().enumerate() {
            cell_list.add_point(j, position);
        }

        let mut entries = Vec::new();
        for (i, &position) in reference.iter().enumerate() {
            cell_list.for_each_candidate(position, |j| {
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

        let mut cell_list = CellList::new(cell, interval.max_cutoff, &[reference]);
        for (i, &position) in reference.iter().enumerate() {
            cell_list.add_point(i, position);
        }

        let mut entries = Vec::new();
        for (i, &position) in reference.iter().enumerate() {
            cell_list.for_each_candidate(position, |j| {
                // the candidates around i include i itself and every j < i,
                // which are already handled by the earlier queries
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

/// A grid of cells over the searched coordinates, each cell holding the
/// indexes of the points binned in it
struct CellList {
    /// cell defining the grid: the periodic cell itself, or a pseudo cell
    /// built around non-periodic coordinates
    grid_cell: UnitCell,
    /// shift applied to the coordinates before binning, moving them away
    /// from the pseudo cell boundary (zero for periodic cells)
    offset: Vector3D,
    /// whether the neighbor search wraps around the grid boundaries
    periodic: bool,
    /// how many cells to look at in each direction when searching neighbors
    /// to cover the cutoff
    n_search: [i32; 3],
    /// the cells themselves
    cells: Array3<Vec<usize>>,
}

impl CellList {
    /// Create a cell list for a search with the given `cutoff`. When `cell`
    /// is infinite, a pseudo cell is built around `coordinates` (which must
    /// not all be empty).
    #[time_graph::instrument(name = "CellList")]
    fn new(cell: &UnitCell, cutoff: f64, coordinates: &[&[Vector3D]]) -> CellList {
        let (grid_cell, offset) = if cell.is_infinite() {
            pseudo_cell(coordinates, cutoff)
        } else {
            (*cell, Vector3D::zero())
        };

        let distances_between_faces = grid_cell.distances_between_faces();

        let mut n_cells = [
            f64::clamp(f64::trunc(distances_between_faces[0] / cutoff), 1.0, f64::INFINITY),
            f64::clamp(f64::trunc(distances_between_faces[1] / cutoff), 1.0, f64::INFINITY),
            f64::clamp(f64::trunc(distances_between_faces[2] / cutoff), 1.0, f64::INFINITY),
        ];
        assert!(n_cells[0].is_finite() && n_cells[1].is_finite() && n_cells[2].is_finite());

        // limit memory consumption by keeping the total number of cells
        // close to `MAX_NUMBER_OF_CELLS`, with roughly the same number of
        // cells in each direction as before
        let n_cells_total = n_cells[0] * n_cells[1] * n_cells[2];
        if n_cells_total > MAX_NUMBER_OF_CELLS {
            let ratio_x_y = n_cells[0] / n_cells[1];
            let ratio_y_z = n_cells[1] / n_cells[2];

            n_cells[2] = f64::max(f64::trunc(f64::cbrt(MAX_NUMBER_OF_CELLS / (ratio_x_y * ratio_y_z * ratio_y_z))), 1.0);
            n_cells[1] = f64::max(f64::trunc(ratio_y_z * n_cells[2]), 1.0);
            n_cells[0] = f64::max(f64::trunc(ratio_x_y * n_cells[1]), 1.0);
        }

        // number of cells to search in each direction to make sure all
        // pairs below the cutoff are accounted for
        let mut n_search = [
            f64::ceil(cutoff * n_cells[0] / distances_between_faces[0]) as i32,
            f64::ceil(cutoff * n_cells[1] / distances_between_faces[1]) as i32,
            f64::ceil(cutoff * n_cells[2] / distances_between_faces[2]) as i32,
        ];

        let n_cells = [
            n_cells[0] as usize,
            n_cells[1] as usize,
            n_cells[2] as usize,
        ];

        for xyz in 0..3 {
            // searching further than the full grid never finds more cells
            n_search[xyz] = i32::clamp(n_search[xyz], 1, n_cells[xyz] as i32);
        }

        CellList {
            grid_cell: grid_cell,
            offset: offset,
            periodic: !cell.is_infinite(),
            n_search: n_search,
            cells: Array3::from_elem(n_cells, Vec::new()),
        }
    }

    /// Add a point to the cell list at the given `position`. The point is
    /// identified by its `index` in the searched set.
    fn add_point(&mut self, index: usize, position: Vector3D) {
        let cell_index = self.cell_index(position);

        let n_cells = self.cells.shape();
        let n_cells = [n_cells[0], n_cells[1], n_cells[2]];

        let cell_index = if self.periodic {
            let (_, wrapped) = divmod_vec(cell_index, n_cells);
            wrapped
        } else {
            // the pseudo cell encloses all coordinates, the clamp only
            // guards against points exactly on the outer boundary
            [
                i32::clamp(cell_index[0], 0, n_cells[0] as i32 - 1) as usize,
                i32::clamp(cell_index[1], 0, n_cells[1] as i32 - 1) as usize,
                i32::clamp(cell_index[2], 0, n_cells[2] as i32 - 1) as usize,
            ]
        };

        self.cells[cell_index].push(index);
    }

    /// Pass the index of every binned point in the cells around `position`
    /// to `candidate`. Each binned point is passed at most once, even when
    /// the search window wraps all the way around a small periodic cell.
    fn for_each_candidate(&self, position: Vector3D, mut candidate: impl FnMut(usize)) {
        let center = self.cell_index(position);

        let n_cells = self.cells.shape();
        let search_x = axis_search(center[0], self.n_search[0], n_cells[0], self.periodic);
        let search_y = axis_search(center[1], self.n_search[1], n_cells[1], self.periodic);
        let search_z = axis_search(center[2], self.n_search[2], n_cells[2], self.periodic);

        for &x in &search_x {
            for &y in &search_y {
                for &z in &search_z {
                    for &index in &self.cells[[x, y, z]] {
                        candidate(index);
                    }
                }
            }
        }
    }

    /// Raw (unwrapped) grid index of the cell containing `position`
    fn cell_index(&self, position: Vector3D) -> [i32; 3] {
        let fractional = self.grid_cell.fractional(position + self.offset);

        let n_cells = self.cells.shape();
        return [
            f64::floor(fractional[0] * n_cells[0] as f64) as i32,
            f64::floor(fractional[1] * n_cells[1] as f64) as i32,
            f64::floor(fractional[2] * n_cells[2] as f64) as i32,
        ];
    }
}

/// Distinct cells to visit along one axis for a search window of
/// `2 * n_search + 1` cells centered on `center`. With periodic wrapping,
/// windows covering the full axis collapse to one visit per cell; without
/// it, the window is clipped to the grid.
fn axis_search(center: i32, n_search: i32, n_cells: usize, periodic: bool) -> Vec<usize> {
    if periodic {
        if 2 * n_search + 1 >= n_cells as i32 {
            return (0..n_cells).collect();
        }
        return (-n_search..=n_search).map(|delta| {
            divmod(center.saturating_add(delta), n_cells).1
        }).collect();
    }

    let start = i32::max(center.saturating_sub(n_search), 0);
    let stop = i32::min(center.saturating_add(n_search), n_cells as i32 - 1);
    return (start..=stop).map(|index| index as usize).collect();
}

/// Build an orthorhombic pseudo cell enclosing all `coordinates` with a
/// comfortable margin, and the shift moving the coordinates away from the
/// cell boundary
fn pseudo_cell(coordinates: &[&[Vector3D]], cutoff: f64) -> (UnitCell, Vector3D) {
    let mut min = Vector3D::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
    let mut max = Vector3D::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    for set in coordinates {
        for position in *set {
            for k in 0..3 {
                min[k] = f64::min(min[k], position[k]);
                max[k] = f64::max(max[k], position[k]);
            }
        }
    }

    let span = max - min;
    let size = f64::max(span[0], f64::max(span[1], span[2]));

    let edge = if size < 2.0 * cutoff {
        // every point ends up a candidate of every other, the grid degrades
        // to brute force
        warn!(
            "coordinates spanning {} are all within the cutoff {} of each other",
            size, cutoff
        );
        2.2 * cutoff
    } else {
        1.2 * size
    };

    let offset = Vector3D::new(
        0.1 * size - min[0],
        0.1 * size - min[1],
        0.1 * size - min[2],
    );

    return (UnitCell::cubic(edge), offset);
}

/// Compute both quotient and remainder of the division of `a` by `b`, with
/// the remainder always positive like in Python
fn divmod(a: i32, b: usize) -> (i32, usize) {
    debug_assert!(b < (i32::MAX as usize));
    let b = b as i32;
    let mut quotient = a / b;
    let mut remainder = a % b;
    if remainder < 0 {
        remainder += b;
        quotient -= 1;
    }
    return (quotient, remainder as usize);
}

/// Apply the [`divmod`] function to three components at the time
fn divmod_vec(a: [i32; 3], b: [usize; 3]) -> ([i32; 3], [usize; 3]) {
    let (qx, rx) = divmod(a[0], b[0]);
    let (qy, ry) = divmod(a[1], b[1]);
    let (qz, rz) = divmod(a[2], b[2]);
    return ([qx, qy, qz], [rx, ry, rz]);
}
