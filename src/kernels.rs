//! Vectorized distance kernels: pairwise and condensed distance arrays, bond
//! lengths, angles, dihedrals, coordinate wrapping and fractional transforms,
//! all of them aware of periodic boundary conditions through [`UnitCell`].
//!
//! Every kernel rounds the input coordinates to single precision before
//! computing, and accumulates in double precision. This keeps the results
//! bit-comparable between pipelines that store coordinates as `f32` and
//! pipelines that keep them as `f64`, and it is the same contract as
//! [`UnitCell::from_parameters`] for the box description. The scalar
//! geometry functions on [`UnitCell`] do not round and can be used when full
//! input precision is wanted.

use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, ArrayViewMut1, Axis, Zip};

use crate::cell::UnitCell;
use crate::errors::Error;
use crate::types::Vector3D;

/// How a kernel splits its work.
///
/// This is a regular argument of the kernels instead of a process-wide
/// switch: two calls with different strategies can run concurrently, and the
/// choice is always visible at the call site. `Parallel` only splits
/// independent slices of the output between threads, so both strategies
/// produce bit-identical results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[derive(serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Execution {
    /// Run everything on the calling thread
    #[default]
    Serial,
    /// Split independent output slices over the rayon thread pool
    Parallel,
}

/// Round a single position to the nearest single precision value in each
/// component
pub(crate) fn single_precision(vector: Vector3D) -> Vector3D {
    return Vector3D::new(
        f64::from(vector[0] as f32),
        f64::from(vector[1] as f32),
        f64::from(vector[2] as f32),
    );
}

/// Round all positions to single precision
pub(crate) fn narrowed(coordinates: &[Vector3D]) -> Vec<Vector3D> {
    return coordinates.iter().copied().map(single_precision).collect();
}

fn check_result_shape(actual: &[usize], expected: &[usize]) -> Result<(), Error> {
    if actual != expected {
        return Err(Error::InvalidParameter(format!(
            "wrong shape for the result array: expected {:?}, got {:?}",
            expected, actual
        )));
    }
    return Ok(());
}

fn check_same_length(sizes: &[usize], names: &[&str]) -> Result<(), Error> {
    debug_assert_eq!(sizes.len(), names.len());
    if sizes.iter().any(|&size| size != sizes[0]) {
        let description = names.iter().zip(sizes)
            .map(|(name, size)| format!("{} has {} values", name, size))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(Error::InvalidParameter(format!(
            "all coordinate slices must have the same length: {}", description
        )));
    }
    return Ok(());
}

/// Compute all pairwise minimum image distances between the points in
/// `reference` and the points in `configuration`, as an array of shape
/// `(reference.len(), configuration.len())`.
pub fn distance_array(
    reference: &[Vector3D],
    configuration: &[Vector3D],
    cell: &UnitCell,
    execution: Execution,
) -> Array2<f64> {
    let mut result = Array2::zeros((reference.len(), configuration.len()));
    fill_distance_array(reference, configuration, cell, execution, &mut result);
    return result;
}

/// Same as [`distance_array`], but writing the distances to a pre-allocated
/// `result` array.
///
/// # Errors
///
/// Returns `Error::InvalidParameter` if `result` does not have exactly the
/// shape `(reference.len(), configuration.len())`.
pub fn distance_array_into(
    reference: &[Vector3D],
    configuration: &[Vector3D],
    cell: &UnitCell,
    execution: Execution,
    result: &mut Array2<f64>,
) -> Result<(), Error> {
    check_result_shape(result.shape(), &[reference.len(), configuration.len()])?;
    fill_distance_array(reference, configuration, cell, execution, result);
    return Ok(());
}

fn fill_distance_array(
    reference: &[Vector3D],
    configuration: &[Vector3D],
    cell: &UnitCell,
    execution: Execution,
    result: &mut Array2<f64>,
) {
    let reference = narrowed(reference);
    let configuration = narrowed(configuration);

    fn fill_row(mut row: ArrayViewMut1<'_, f64>, u: Vector3D, configuration: &[Vector3D], cell: &UnitCell) {
        for (j, value) in row.iter_mut().enumerate() {
            *value = cell.distance(u, configuration[j]);
        }
    }

    // one row of the output per reference point, rows are independent
    let zip = Zip::from(result.rows_mut()).and(&reference[..]);
    match execution {
        Execution::Serial => zip.for_each(|row, &u| {
            fill_row(row, u, &configuration, cell);
        }),
        Execution::Parallel => zip.par_for_each(|row, &u| {
            fill_row(row, u, &configuration, cell);
        }),
    }
}

/// Compute the minimum image distances between all distinct pairs of points
/// in `reference`, as a condensed array of length `n * (n - 1) / 2` with the
/// distance between points `i` and `j > i` at position
/// `i * n - i * (i + 1) / 2 + j - i - 1`, i.e. the row-major upper triangle
/// of the full matrix: `(0, 1), (0, 2), ... (0, n-1), (1, 2), ...`
pub fn self_distance_array(
    reference: &[Vector3D],
    cell: &UnitCell,
    execution: Execution,
) -> Array1<f64> {
    let n = reference.len();
    let mut result = Array1::zeros(n * n.saturating_sub(1) / 2);
    fill_self_distance_array(reference, cell, execution, &mut result);
    return result;
}

/// Same as [`self_distance_array`], but writing the distances to a
/// pre-allocated `result` array.
///
/// # Errors
///
/// Returns `Error::InvalidParameter` if `result` does not have exactly
/// `n * (n - 1) / 2` entries.
pub fn self_distance_array_into(
    reference: &[Vector3D],
    cell: &UnitCell,
    execution: Execution,
    result: &mut Array1<f64>,
) -> Result<(), Error> {
    let n = reference.len();
    check_result_shape(result.shape(), &[n * n.saturating_sub(1) / 2])?;
    fill_self_distance_array(reference, cell, execution, result);
    return Ok(());
}

fn fill_self_distance_array(
    reference: &[Vector3D],
    cell: &UnitCell,
    execution: Execution,
    result: &mut Array1<f64>,
) {
    let reference = narrowed(reference);
    let n = reference.len();

    // split the condensed output in one slice per `i`, each one holding the
    // distances from point i to all points j > i
    let mut rows = Vec::with_capacity(n.saturating_sub(1));
    let mut rest = result.view_mut();
    for i in 0..n.saturating_sub(1) {
        let (row, tail) = rest.split_at(Axis(0), n - 1 - i);
        rows.push(row);
        rest = tail;
    }

    fn fill_row(mut row: ArrayViewMut1<'_, f64>, i: usize, reference: &[Vector3D], cell: &UnitCell) {
        let u = reference[i];
        for (offset, value) in row.iter_mut().enumerate() {
            *value = cell.distance(u, reference[i + 1 + offset]);
        }
    }

    match execution {
        Execution::Serial => rows.into_iter().enumerate().for_each(|(i, row)| {
            fill_row(row, i, &reference, cell);
        }),
        Execution::Parallel => rows.into_par_iter().enumerate().for_each(|(i, row)| {
            fill_row(row, i, &reference, cell);
        }),
    }
}

/// Compute the minimum image distance between `first[i]` and `second[i]` for
/// each `i`. The two slices must have the same length.
///
/// # Errors
///
/// Returns `Error::InvalidParameter` if the slices have different lengths.
pub fn bond_lengths(
    first: &[Vector3D],
    second: &[Vector3D],
    cell: &UnitCell,
    execution: Execution,
) -> Result<Array1<f64>, Error> {
    check_same_length(&[first.len(), second.len()], &["first", "second"])?;
    let mut result = Array1::zeros(first.len());
    fill_bond_lengths(first, second, cell, execution, &mut result);
    return Ok(result);
}

/// Same as [`bond_lengths`], but writing the distances to a pre-allocated
/// `result` array.
///
/// # Errors
///
/// Returns `Error::InvalidParameter` if the slices have different lengths or
/// if `result` does not have exactly one entry per pair.
pub fn bond_lengths_into(
    first: &[Vector3D],
    second: &[Vector3D],
    cell: &UnitCell,
    execution: Execution,
    result: &mut Array1<f64>,
) -> Result<(), Error> {
    check_same_length(&[first.len(), second.len()], &["first", "second"])?;
    check_result_shape(result.shape(), &[first.len()])?;
    fill_bond_lengths(first, second, cell, execution, result);
    return Ok(());
}

fn fill_bond_lengths(
    first: &[Vector3D],
    second: &[Vector3D],
    cell: &UnitCell,
    execution: Execution,
    result: &mut Array1<f64>,
) {
    let first = narrowed(first);
    let second = narrowed(second);

    let zip = Zip::from(&mut *result).and(&first[..]).and(&second[..]);
    match execution {
        Execution::Serial => zip.for_each(|value, &u, &v| {
            *value = cell.distance(u, v);
        }),
        Execution::Parallel => zip.par_for_each(|value, &u, &v| {
            *value = cell.distance(u, v);
        }),
    }
}

/// Compute the angle at `apex[i]` between the minimum image displacements
/// towards `a[i]` and `c[i]`, in radians in `[0, π]`.
///
/// If one of the displacements has zero length (the apex coincides with one
/// of the end points), the angle is 0.
///
/// # Errors
///
/// Returns `Error::InvalidParameter` if the slices have different lengths.
pub fn angles(
    a: &[Vector3D],
    apex: &[Vector3D],
    c: &[Vector3D],
    cell: &UnitCell,
    execution: Execution,
) -> Result<Array1<f64>, Error> {
    check_same_length(&[a.len(), apex.len(), c.len()], &["a", "apex", "c"])?;
    let mut result = Array1::zeros(a.len());
    fill_angles(a, apex, c, cell, execution, &mut result);
    return Ok(result);
}

/// Same as [`angles`], but writing the angles to a pre-allocated `result`
/// array.
///
/// # Errors
///
/// Returns `Error::InvalidParameter` if the slices have different lengths or
/// if `result` does not have exactly one entry per triplet.
pub fn angles_into(
    a: &[Vector3D],
    apex: &[Vector3D],
    c: &[Vector3D],
    cell: &UnitCell,
    execution: Execution,
    result: &mut Array1<f64>,
) -> Result<(), Error> {
    check_same_length(&[a.len(), apex.len(), c.len()], &["a", "apex", "c"])?;
    check_result_shape(result.shape(), &[a.len()])?;
    fill_angles(a, apex, c, cell, execution, result);
    return Ok(());
}

fn fill_angles(
    a: &[Vector3D],
    apex: &[Vector3D],
    c: &[Vector3D],
    cell: &UnitCell,
    execution: Execution,
    result: &mut Array1<f64>,
) {
    let a = narrowed(a);
    let apex = narrowed(apex);
    let c = narrowed(c);

    // atan2 of the cross and dot products is more accurate than acos of the
    // dot product alone, and gives 0 for degenerate inputs
    fn angle(a: Vector3D, apex: Vector3D, c: Vector3D, cell: &UnitCell) -> f64 {
        let mut u = a - apex;
        cell.vector_image(&mut u);
        let mut v = c - apex;
        cell.vector_image(&mut v);

        return f64::atan2((u ^ v).norm(), u * v);
    }

    let zip = Zip::from(&mut *result).and(&a[..]).and(&apex[..]).and(&c[..]);
    match execution {
        Execution::Serial => zip.for_each(|value, &a, &apex, &c| {
            *value = angle(a, apex, c, cell);
        }),
        Execution::Parallel => zip.par_for_each(|value, &a, &apex, &c| {
            *value = angle(a, apex, c, cell);
        }),
    }
}

/// Compute the dihedral angle around the `b[i]`–`c[i]` axis, between the
/// planes spanned by (`a[i]`, `b[i]`, `c[i]`) and (`b[i]`, `c[i]`, `d[i]`),
/// in radians in `[-π, π]`: 0 for a cis arrangement, ±π for trans, with the
/// sign following the right hand rule around the axis. All displacements use
/// the minimum image convention.
///
/// When three consecutive points are colinear the dihedral is not defined,
/// and the result is NaN.
///
/// # Errors
///
/// Returns `Error::InvalidParameter` if the slices have different lengths.
pub fn dihedrals(
    a: &[Vector3D],
    b: &[Vector3D],
    c: &[Vector3D],
    d: &[Vector3D],
    cell: &UnitCell,
    execution: Execution,
) -> Result<Array1<f64>, Error> {
    check_same_length(&[a.len(), b.len(), c.len(), d.len()], &["a", "b", "c", "d"])?;
    let mut result = Array1::zeros(a.len());
    fill_dihedrals(a, b, c, d, cell, execution, &mut result);
    return Ok(result);
}

/// Same as [`dihedrals`], but writing the angles to a pre-allocated `result`
/// array.
///
/// # Errors
///
/// Returns `Error::InvalidParameter` if the slices have different lengths or
/// if `result` does not have exactly one entry per quadruplet.
pub fn dihedrals_into(
    a: &[Vector3D],
    b: &[Vector3D],
    c: &[Vector3D],
    d: &[Vector3D],
    cell: &UnitCell,
    execution: Execution,
    result: &mut Array1<f64>,
) -> Result<(), Error> {
    check_same_length(&[a.len(), b.len(), c.len(), d.len()], &["a", "b", "c", "d"])?;
    check_result_shape(result.shape(), &[a.len()])?;
    fill_dihedrals(a, b, c, d, cell, execution, result);
    return Ok(());
}

fn fill_dihedrals(
    a: &[Vector3D],
    b: &[Vector3D],
    c: &[Vector3D],
    d: &[Vector3D],
    cell: &UnitCell,
    execution: Execution,
    result: &mut Array1<f64>,
) {
    let a = narrowed(a);
    let b = narrowed(b);
    let c = narrowed(c);
    let d = narrowed(d);

    fn dihedral(a: Vector3D, b: Vector3D, c: Vector3D, d: Vector3D, cell: &UnitCell) -> f64 {
        let mut va = b - a;
        cell.vector_image(&mut va);
        let mut vb = c - b;
        cell.vector_image(&mut vb);
        let mut vc = d - c;
        cell.vector_image(&mut vc);

        let n1 = -(va ^ vb);
        let n2 = -(vb ^ vc);

        let x = n1 * n2;
        let y = (n1 ^ n2) * vb / vb.norm();
        if x == 0.0 && y == 0.0 {
            // colinear frame, both normals vanish
            return f64::NAN;
        }
        return f64::atan2(y, x);
    }

    let zip = Zip::from(&mut *result).and(&a[..]).and(&b[..]).and(&c[..]).and(&d[..]);
    match execution {
        Execution::Serial => zip.for_each(|value, &a, &b, &c, &d| {
            *value = dihedral(a, b, c, d, cell);
        }),
        Execution::Parallel => zip.par_for_each(|value, &a, &b, &c, &d| {
            *value = dihedral(a, b, c, d, cell);
        }),
    }
}

/// Wrap all coordinates inside the primary unit cell. For an orthorhombic
/// cell with lengths `(L_a, L_b, L_c)` the output components are in
/// `[0, L_a) x [0, L_b) x [0, L_c)`; for triclinic cells the output has
/// fractional coordinates in `[0, 1)`. With an infinite cell the coordinates
/// are returned unchanged (after the usual single precision rounding).
pub fn apply_pbc(coordinates: &[Vector3D], cell: &UnitCell) -> Vec<Vector3D> {
    return coordinates.iter().map(|&position| {
        let mut wrapped = single_precision(position);
        cell.wrap_vector(&mut wrapped);
        wrapped
    }).collect();
}

/// Transform all coordinates from real space to fractional coordinates of
/// the given cell. For an infinite cell this is the identity.
pub fn to_fractional(coordinates: &[Vector3D], cell: &UnitCell) -> Vec<Vector3D> {
    return coordinates.iter().map(|&position| {
        cell.fractional(single_precision(position))
    }).collect();
}

/// Transform all coordinates from fractional coordinates of the given cell
/// back to real space. For an infinite cell this is the identity.
pub fn to_cartesian(fractional: &[Vector3D], cell: &UnitCell) -> Vec<Vector3D> {
    return fractional.iter().map(|&position| {
        cell.cartesian(single_precision(position))
    }).collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr1;

    fn scattered_points(count: usize) -> Vec<Vector3D> {
        // deterministic, aperiodic-looking positions in roughly [0, 10)^3
        (0..count).map(|i| {
            let t = i as f64;
            Vector3D::new(
                5.0 + 4.9 * f64::sin(1.7 * t + 0.4),
                5.0 + 4.9 * f64::sin(2.3 * t + 1.1),
                5.0 + 4.9 * f64::sin(3.1 * t + 2.5),
            )
        }).collect()
    }

    #[test]
    fn distance_array_minimum_image() {
        let cell = UnitCell::cubic(10.0);
        let reference = [Vector3D::new(1.0, 1.0, 1.0)];
        let configuration = [Vector3D::new(9.0, 9.0, 9.0)];

        let distances = distance_array(&reference, &configuration, &cell, Execution::Serial);
        assert_eq!(distances.shape(), [1, 1]);
        // the image of (9, 9, 9) at (-1, -1, -1) is the closest one
        assert_eq!(distances[[0, 0]], f64::sqrt(12.0));

        // without the cell, the distance is the plain euclidean one
        let distances = distance_array(&reference, &configuration, &UnitCell::infinite(), Execution::Serial);
        assert_eq!(distances[[0, 0]], f64::sqrt(3.0 * 64.0));
    }

    #[test]
    fn distance_array_shapes() {
        let cell = UnitCell::cubic(10.0);
        let reference = scattered_points(4);
        let configuration = scattered_points(7);

        let distances = distance_array(&reference, &configuration, &cell, Execution::Serial);
        assert_eq!(distances.shape(), [4, 7]);

        let distances = distance_array(&[], &configuration, &cell, Execution::Serial);
        assert_eq!(distances.shape(), [0, 7]);

        // identical points are at distance zero, and kept
        let same = [Vector3D::new(1.0, 2.0, 3.0)];
        let distances = distance_array(&same, &same, &cell, Execution::Serial);
        assert_eq!(distances[[0, 0]], 0.0);
    }

    #[test]
    fn condensed_ordering() {
        // four points on a line: distances (0,1)=1, (0,2)=3, (0,3)=6,
        //                                  (1,2)=2, (1,3)=5, (2,3)=3
        let points = [
            Vector3D::new(0.0, 0.0, 0.0),
            Vector3D::new(1.0, 0.0, 0.0),
            Vector3D::new(3.0, 0.0, 0.0),
            Vector3D::new(6.0, 0.0, 0.0),
        ];
        let condensed = self_distance_array(&points, &UnitCell::infinite(), Execution::Serial);
        assert_eq!(condensed, arr1(&[1.0, 3.0, 6.0, 2.0, 5.0, 3.0]));
    }

    #[test]
    fn condensed_matches_full_matrix() {
        let cell = UnitCell::triclinic(10.0, 10.0, 10.0, 80.0, 95.0, 110.0);
        let points = scattered_points(12);

        let condensed = self_distance_array(&points, &cell, Execution::Serial);
        assert_eq!(condensed.len(), 12 * 11 / 2);

        let full = distance_array(&points, &points, &cell, Execution::Serial);
        let mut k = 0;
        for i in 0..points.len() {
            for j in (i + 1)..points.len() {
                assert_eq!(condensed[k], full[[i, j]]);
                k += 1;
            }
        }
    }

    #[test]
    fn single_point_and_empty_condensed() {
        let cell = UnitCell::cubic(10.0);
        assert_eq!(self_distance_array(&[], &cell, Execution::Serial).len(), 0);

        let single = [Vector3D::new(1.0, 1.0, 1.0)];
        assert_eq!(self_distance_array(&single, &cell, Execution::Serial).len(), 0);
    }

    #[test]
    fn bonds() {
        let cell = UnitCell::cubic(10.0);
        let first = [Vector3D::new(0.5, 5.0, 5.0), Vector3D::new(1.0, 1.0, 1.0)];
        let second = [Vector3D::new(9.5, 5.0, 5.0), Vector3D::new(1.0, 1.0, 2.0)];

        let lengths = bond_lengths(&first, &second, &cell, Execution::Serial).unwrap();
        // (0.5, 5, 5) and (9.5, 5, 5) are one length unit apart through the
        // periodic boundary
        assert_eq!(lengths[0], 1.0);
        assert_eq!(lengths[1], 1.0);

        let result = bond_lengths(&first, &second[..1], &cell, Execution::Serial);
        let message = result.unwrap_err().to_string();
        assert!(message.contains("must have the same length"));
    }

    #[test]
    fn angles_values() {
        let cell = UnitCell::infinite();
        let a = [
            Vector3D::new(1.0, 0.0, 0.0),
            Vector3D::new(1.0, 0.0, 0.0),
            Vector3D::new(0.0, 0.0, 0.0),
        ];
        let apex = [
            Vector3D::new(0.0, 0.0, 0.0),
            Vector3D::new(0.0, 0.0, 0.0),
            Vector3D::new(0.0, 0.0, 0.0),
        ];
        let c = [
            Vector3D::new(0.0, 1.0, 0.0),
            Vector3D::new(-2.0, 0.0, 0.0),
            Vector3D::new(0.0, 1.0, 0.0),
        ];

        let result = angles(&a, &apex, &c, &cell, Execution::Serial).unwrap();
        assert_eq!(result[0], std::f64::consts::FRAC_PI_2);
        assert_eq!(result[1], std::f64::consts::PI);
        // apex == a: the angle is not defined, and reported as 0
        assert_eq!(result[2], 0.0);
    }

    #[test]
    fn angles_through_boundary() {
        let cell = UnitCell::cubic(10.0);
        let a = [Vector3D::new(9.5, 0.0, 0.0)];
        let apex = [Vector3D::new(0.0, 0.0, 0.0)];
        let c = [Vector3D::new(0.0, 1.0, 0.0)];

        // the minimum image of a is at (-0.5, 0, 0), at 90° from c
        let result = angles(&a, &apex, &c, &cell, Execution::Serial).unwrap();
        assert_eq!(result[0], std::f64::consts::FRAC_PI_2);
    }

    #[test]
    fn dihedrals_values() {
        let cell = UnitCell::infinite();
        let a = [Vector3D::new(0.0, 1.0, 0.0); 4];
        let b = [Vector3D::new(0.0, 0.0, 0.0); 4];
        let c = [Vector3D::new(1.0, 0.0, 0.0); 4];
        let d = [
            Vector3D::new(1.0, 1.0, 0.0),  // cis
            Vector3D::new(1.0, -1.0, 0.0), // trans
            Vector3D::new(1.0, 0.0, 1.0),  // +90°
            Vector3D::new(2.0, 0.0, 0.0),  // colinear with b-c
        ];

        let result = dihedrals(&a, &b, &c, &d, &cell, Execution::Serial).unwrap();
        assert_eq!(result[0], 0.0);
        assert_eq!(result[1], std::f64::consts::PI);
        assert_eq!(result[2], std::f64::consts::FRAC_PI_2);
        assert!(result[3].is_nan());
    }

    #[test]
    fn dihedral_colinear_first_arm() {
        let cell = UnitCell::infinite();
        // a, b, c on a line: the first plane does not exist
        let a = [Vector3D::new(-1.0, 0.0, 0.0)];
        let b = [Vector3D::new(0.0, 0.0, 0.0)];
        let c = [Vector3D::new(1.0, 0.0, 0.0)];
        let d = [Vector3D::new(2.0, 1.0, 0.0)];

        let result = dihedrals(&a, &b, &c, &d, &cell, Execution::Serial).unwrap();
        assert!(result[0].is_nan());
    }

    #[test]
    fn wrapping() {
        let cell = UnitCell::cubic(10.0);
        let coordinates = [
            Vector3D::new(12.0, -1.0, 5.0),
            Vector3D::new(-22.5, 10.0, 0.0),
        ];
        let wrapped = apply_pbc(&coordinates, &cell);
        assert_eq!(wrapped[0], Vector3D::new(2.0, 9.0, 5.0));
        assert_eq!(wrapped[1], Vector3D::new(7.5, 0.0, 0.0));

        // no cell, no wrapping
        let unchanged = apply_pbc(&coordinates, &UnitCell::infinite());
        assert_eq!(unchanged[0], coordinates[0]);
        assert_eq!(unchanged[1], coordinates[1]);

        // wrapped triclinic coordinates have fractional coordinates in [0, 1)
        let cell = UnitCell::triclinic(10.0, 12.0, 14.0, 70.0, 80.0, 120.0);
        let wrapped = apply_pbc(&scattered_points(10), &cell);
        for position in wrapped {
            let fractional = cell.fractional(position);
            for k in 0..3 {
                assert!((0.0..1.0).contains(&fractional[k]));
            }
        }
    }

    #[test]
    fn fractional_round_trip() {
        let cell = UnitCell::triclinic(10.0, 12.0, 14.0, 70.0, 80.0, 120.0);
        let coordinates = scattered_points(10);

        let fractional = to_fractional(&coordinates, &cell);
        let back = to_cartesian(&fractional, &cell);

        // the round trip is exact up to the single precision rounding of the
        // fractional coordinates
        for (position, recovered) in coordinates.iter().zip(&back) {
            let expected = single_precision(*position);
            for k in 0..3 {
                assert_relative_eq!(recovered[k], expected[k], epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn preallocated_output() {
        let cell = UnitCell::cubic(10.0);
        let reference = scattered_points(5);
        let configuration = scattered_points(8);

        let mut result = Array2::zeros((5, 8));
        distance_array_into(&reference, &configuration, &cell, Execution::Serial, &mut result).unwrap();
        assert_eq!(result, distance_array(&reference, &configuration, &cell, Execution::Serial));

        let mut wrong = Array2::zeros((8, 5));
        let error = distance_array_into(&reference, &configuration, &cell, Execution::Serial, &mut wrong);
        let message = error.unwrap_err().to_string();
        assert!(message.contains("wrong shape for the result array"));

        let mut result = Array1::zeros(5 * 4 / 2);
        self_distance_array_into(&reference, &cell, Execution::Serial, &mut result).unwrap();
        assert_eq!(result, self_distance_array(&reference, &cell, Execution::Serial));

        let mut wrong = Array1::zeros(11);
        let error = self_distance_array_into(&reference, &cell, Execution::Serial, &mut wrong);
        assert!(error.is_err());

        let mut wrong = Array1::zeros(4);
        let error = bond_lengths_into(&reference, &configuration[..5], &cell, Execution::Serial, &mut wrong);
        assert!(error.is_err());
    }

    #[test]
    fn parallel_matches_serial() {
        let cell = UnitCell::triclinic(10.0, 11.0, 12.0, 85.0, 95.0, 105.0);
        let reference = scattered_points(20);
        let configuration = scattered_points(17);

        assert_eq!(
            distance_array(&reference, &configuration, &cell, Execution::Serial),
            distance_array(&reference, &configuration, &cell, Execution::Parallel),
        );

        assert_eq!(
            self_distance_array(&reference, &cell, Execution::Serial),
            self_distance_array(&reference, &cell, Execution::Parallel),
        );

        let first = scattered_points(20);
        let second = scattered_points(40)[20..].to_vec();
        assert_eq!(
            bond_lengths(&first, &second, &cell, Execution::Serial).unwrap(),
            bond_lengths(&first, &second, &cell, Execution::Parallel).unwrap(),
        );

        let apex = apply_pbc(&scattered_points(25)[5..], &cell);
        assert_eq!(
            angles(&first, &apex, &second, &cell, Execution::Serial).unwrap(),
            angles(&first, &apex, &second, &cell, Execution::Parallel).unwrap(),
        );

        let fourth = apply_pbc(&scattered_points(30)[10..], &cell);
        assert_eq!(
            dihedrals(&first, &apex, &second, &fourth, &cell, Execution::Serial).unwrap(),
            dihedrals(&first, &apex, &second, &fourth, &cell, Execution::Parallel).unwrap(),
        );
    }
}
