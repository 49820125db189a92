//! The `UnitCell` type describes the periodic boundaries of a system: either
//! no periodicity at all, an orthorhombic box, or a fully triclinic box. It
//! owns all the geometric operations that depend on the periodicity: wrapping
//! coordinates, fractional/cartesian transforms and minimum image distances.
use std::f64;

use crate::errors::Error;
use crate::{Matrix3, Vector3D};

/// The shape of a cell determines how periodic boundary conditions are
/// applied.
#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub enum CellShape {
    /// Infinite unit cell, without boundaries
    Infinite,
    /// Orthorhombic unit cell, with cuboid shape
    Orthorhombic,
    /// Triclinic unit cell, with arbitrary parallelepiped shape
    Triclinic,
}

/// An `UnitCell` defines the system physical boundaries.
///
/// The cell matrix stores the three cell vectors as rows; for triclinic cells
/// built from lengths and angles this matrix is lower triangular, the
/// canonical orientation with the first cell vector along `x` and the second
/// one in the `xy` plane. The matrix, its transpose and the inverse of the
/// transpose are computed once at construction and never change afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub struct UnitCell {
    /// Unit cell matrix, cell vectors as rows
    matrix: Matrix3,
    /// Transpose of the unit cell matrix, cached from matrix
    transpose: Matrix3,
    /// Inverse of the transpose of the unit cell matrix, cached from matrix
    inverse: Matrix3,
    /// Unit cell shape
    shape: CellShape,
}

impl From<Matrix3> for UnitCell {
    fn from(matrix: Matrix3) -> UnitCell {
        assert!(matrix.determinant() > 1e-6, "matrix is not invertible");

        let is_close_0 = |value| f64::abs(value) < 1e-6;
        let is_diagonal = |matrix: Matrix3| {
            is_close_0(matrix[0][1]) && is_close_0(matrix[0][2]) &&
            is_close_0(matrix[1][0]) && is_close_0(matrix[1][2]) &&
            is_close_0(matrix[2][0]) && is_close_0(matrix[2][1])
        };

        let shape = if is_diagonal(matrix) {
            CellShape::Orthorhombic
        } else {
            CellShape::Triclinic
        };

        return UnitCell {
            matrix: matrix,
            transpose: matrix.transposed(),
            inverse: matrix.transposed().inverse(),
            shape: shape,
        };
    }
}

impl UnitCell {
    /// Create an infinite unit cell, i.e. no periodic boundary conditions
    pub fn infinite() -> UnitCell {
        UnitCell {
            matrix: Matrix3::zero(),
            transpose: Matrix3::zero(),
            inverse: Matrix3::zero(),
            shape: CellShape::Infinite,
        }
    }

    /// Create an orthorhombic unit cell, with side lengths `a, b, c`.
    pub fn orthorhombic(a: f64, b: f64, c: f64) -> UnitCell {
        assert!(a > 0.0 && b > 0.0 && c > 0.0, "Cell lengths must be positive");
        let matrix = Matrix3::new([
            [a, 0.0, 0.0],
            [0.0, b, 0.0],
            [0.0, 0.0, c]
        ]);
        UnitCell {
            matrix: matrix,
            transpose: matrix,
            inverse: matrix.inverse(),
            shape: CellShape::Orthorhombic,
        }
    }

    /// Create a cubic unit cell, with side lengths `length, length, length`.
    pub fn cubic(length: f64) -> UnitCell {
        UnitCell::orthorhombic(length, length, length)
    }

    /// Create a triclinic unit cell, with side lengths `a, b, c` and angles
    /// `alpha, beta, gamma` in degrees.
    pub fn triclinic(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> UnitCell {
        assert!(a > 0.0 && b > 0.0 && c > 0.0, "Cell lengths must be positive");
        return UnitCell::from(triclinic_matrix(a, b, c, alpha, beta, gamma));
    }

    /// Create an unit cell from a 6-value box description `[a, b, c, alpha,
    /// beta, gamma]`, with lengths in the same unit as the coordinates and
    /// angles in degrees.
    ///
    /// This is the validating entry point for box descriptions coming from
    /// the outside: the values are rounded to single precision (the same
    /// storage contract as the distance kernels), a box with all three angles
    /// at 90° becomes `Orthorhombic`, any other valid box becomes `Triclinic`
    /// in the canonical lower triangular orientation. A description with all
    /// six values at zero means no periodic boundaries (`Infinite`).
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidParameter` if the slice does not contain
    /// exactly 6 values, if any value is not finite, if any length is
    /// negative or zero, if any angle is outside `(0, 180)`, or if the
    /// angles taken together do not define a valid cell.
    pub fn from_parameters(parameters: &[f64]) -> Result<UnitCell, Error> {
        if parameters.len() != 6 {
            return Err(Error::InvalidParameter(format!(
                "expected a box description with 6 values, got {}", parameters.len()
            )));
        }

        for &value in parameters {
            if !value.is_finite() {
                return Err(Error::InvalidParameter(format!(
                    "box description contains a non-finite value: {}", value
                )));
            }
        }

        // round to single precision before interpreting the values, to stay
        // consistent with coordinates stored in single precision
        let a = f64::from(parameters[0] as f32);
        let b = f64::from(parameters[1] as f32);
        let c = f64::from(parameters[2] as f32);
        let alpha = f64::from(parameters[3] as f32);
        let beta = f64::from(parameters[4] as f32);
        let gamma = f64::from(parameters[5] as f32);

        if a == 0.0 && b == 0.0 && c == 0.0
            && alpha == 0.0 && beta == 0.0 && gamma == 0.0 {
            return Ok(UnitCell::infinite());
        }

        if !(a > 0.0 && b > 0.0 && c > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "cell lengths must be positive, got a={}, b={}, c={}", a, b, c
            )));
        }

        let valid_angle = |angle| angle > 0.0 && angle < 180.0;
        if !(valid_angle(alpha) && valid_angle(beta) && valid_angle(gamma)) {
            return Err(Error::InvalidParameter(format!(
                "cell angles must be strictly between 0 and 180 degrees, \
                got alpha={}, beta={}, gamma={}", alpha, beta, gamma
            )));
        }

        if alpha == 90.0 && beta == 90.0 && gamma == 90.0 {
            return Ok(UnitCell::orthorhombic(a, b, c));
        }

        let matrix = triclinic_matrix(a, b, c, alpha, beta, gamma);
        let c_z = matrix[2][2];
        if !(c_z > 0.0 && c_z.is_finite()) {
            return Err(Error::InvalidParameter(format!(
                "angles alpha={}, beta={}, gamma={} do not define a valid cell",
                alpha, beta, gamma
            )));
        }

        return Ok(UnitCell {
            matrix: matrix,
            transpose: matrix.transposed(),
            inverse: matrix.transposed().inverse(),
            shape: CellShape::Triclinic,
        });
    }

    /// Get the cell shape
    pub fn shape(&self) -> CellShape {
        self.shape
    }

    /// Check if this unit cell is infinite, *i.e.* if it does not have
    /// periodic boundary conditions.
    pub fn is_infinite(&self) -> bool {
        self.shape() == CellShape::Infinite
    }

    /// Get the first length of the cell (i.e. the norm of the first vector of
    /// the cell)
    pub fn a(&self) -> f64 {
        match self.shape {
            CellShape::Triclinic => self.a_vector().norm(),
            CellShape::Orthorhombic | CellShape::Infinite => self.matrix[0][0],
        }
    }

    /// Get the second length of the cell (i.e. the norm of the second vector
    /// of the cell)
    pub fn b(&self) -> f64 {
        match self.shape {
            CellShape::Triclinic => self.b_vector().norm(),
            CellShape::Orthorhombic | CellShape::Infinite => self.matrix[1][1],
        }
    }

    /// Get the third length of the cell (i.e. the norm of the third vector of
    /// the cell)
    pub fn c(&self) -> f64 {
        match self.shape {
            CellShape::Triclinic => self.c_vector().norm(),
            CellShape::Orthorhombic | CellShape::Infinite => self.matrix[2][2],
        }
    }

    /// Get the first angle of the cell, in degrees
    pub fn alpha(&self) -> f64 {
        match self.shape {
            CellShape::Triclinic => {
                let b = self.b_vector();
                let c = self.c_vector();
                angle(b, c).to_degrees()
            }
            CellShape::Orthorhombic | CellShape::Infinite => 90.0,
        }
    }

    /// Get the second angle of the cell, in degrees
    pub fn beta(&self) -> f64 {
        match self.shape {
            CellShape::Triclinic => {
                let a = self.a_vector();
                let c = self.c_vector();
                angle(a, c).to_degrees()
            }
            CellShape::Orthorhombic | CellShape::Infinite => 90.0,
        }
    }

    /// Get the third angle of the cell, in degrees
    pub fn gamma(&self) -> f64 {
        match self.shape {
            CellShape::Triclinic => {
                let a = self.a_vector();
                let b = self.b_vector();
                angle(a, b).to_degrees()
            }
            CellShape::Orthorhombic | CellShape::Infinite => 90.0,
        }
    }

    /// Get the 6-value box description `[a, b, c, alpha, beta, gamma]` of
    /// this cell, with angles in degrees. For infinite cells all six values
    /// are zero.
    pub fn parameters(&self) -> [f64; 6] {
        if self.is_infinite() {
            return [0.0; 6];
        }
        return [self.a(), self.b(), self.c(), self.alpha(), self.beta(), self.gamma()];
    }

    /// Get the distances between faces of the unit cell
    pub fn distances_between_faces(&self) -> Vector3D {
        if self.shape == CellShape::Infinite {
            return Vector3D::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
        }

        let (a, b, c) = (self.a_vector(), self.b_vector(), self.c_vector());
        // Plans normal vectors
        let na = (b ^ c).normalized();
        let nb = (c ^ a).normalized();
        let nc = (a ^ b).normalized();

        Vector3D::new(f64::abs(na * a), f64::abs(nb * b), f64::abs(nc * c))
    }

    /// Get the volume of the cell
    pub fn volume(&self) -> f64 {
        let volume = match self.shape {
            CellShape::Infinite => 0.0,
            CellShape::Orthorhombic => self.a() * self.b() * self.c(),
            CellShape::Triclinic => {
                // The volume is the mixed product of the three cell vectors
                let a = self.a_vector();
                let b = self.b_vector();
                let c = self.c_vector();
                a * (b ^ c)
            }
        };
        assert!(volume >= 0.0, "Volume is not positive!");
        return volume;
    }

    /// Get the matricial representation of the unit cell
    pub fn matrix(&self) -> Matrix3 {
        self.matrix
    }

    /// Get the first vector of the cell
    fn a_vector(&self) -> Vector3D {
        self.matrix[0].into()
    }

    /// Get the second vector of the cell
    fn b_vector(&self) -> Vector3D {
        self.matrix[1].into()
    }

    /// Get the third vector of the cell
    fn c_vector(&self) -> Vector3D {
        self.matrix[2].into()
    }
}

/// Geometric operations using periodic boundary conditions
impl UnitCell {
    /// Wrap a vector in the unit cell, obeying the periodic boundary
    /// conditions. For a cubic cell of side length `L`, this produces a
    /// vector with all components in `[0, L)`.
    pub fn wrap_vector(&self, vector: &mut Vector3D) {
        match self.shape {
            CellShape::Infinite => (),
            CellShape::Orthorhombic => {
                vector[0] -= f64::floor(vector[0] / self.a()) * self.a();
                vector[1] -= f64::floor(vector[1] / self.b()) * self.b();
                vector[2] -= f64::floor(vector[2] / self.c()) * self.c();
            }
            CellShape::Triclinic => {
                let mut fractional = self.fractional(*vector);
                fractional[0] -= f64::floor(fractional[0]);
                fractional[1] -= f64::floor(fractional[1]);
                fractional[2] -= f64::floor(fractional[2]);
                *vector = self.cartesian(fractional);
            }
        }
    }

    /// Find the minimum norm image of a vector in the unit cell, obeying the
    /// periodic boundary conditions. For a cubic cell of side length `L`,
    /// this produces a vector with all components in `[-L/2, L/2)`.
    ///
    /// For triclinic cells, rounding the fractional coordinates does not
    /// always give the shortest image, so the rounded vector is compared
    /// against its 27 neighboring images and the shortest one wins.
    pub fn vector_image(&self, vector: &mut Vector3D) {
        match self.shape {
            CellShape::Infinite => (),
            CellShape::Orthorhombic => {
                vector[0] -= f64::round(vector[0] / self.a()) * self.a();
                vector[1] -= f64::round(vector[1] / self.b()) * self.b();
                vector[2] -= f64::round(vector[2] / self.c()) * self.c();
            }
            CellShape::Triclinic => {
                let mut fractional = self.fractional(*vector);
                fractional[0] -= f64::round(fractional[0]);
                fractional[1] -= f64::round(fractional[1]);
                fractional[2] -= f64::round(fractional[2]);
                let reduced = self.cartesian(fractional);

                let a = self.a_vector();
                let b = self.b_vector();
                let c = self.c_vector();

                let mut best = reduced;
                let mut best_norm2 = reduced.norm2();
                for i in -1..=1 {
                    for j in -1..=1 {
                        for k in -1..=1 {
                            let image = reduced + (i as f64) * a + (j as f64) * b + (k as f64) * c;
                            let norm2 = image.norm2();
                            if norm2 < best_norm2 {
                                best = image;
                                best_norm2 = norm2;
                            }
                        }
                    }
                }
                *vector = best;
            }
        }
    }

    /// Get the fractional representation of the `vector` in this cell. For
    /// infinite cells this is the identity.
    pub fn fractional(&self, vector: Vector3D) -> Vector3D {
        if self.is_infinite() {
            return vector;
        }
        // this needs to use the inverse of the transpose of the matrix, since
        // we only have code to multiply a vector by a matrix on the left
        return self.inverse * vector;
    }

    /// Get the Cartesian representation of the `fractional` vector in this
    /// cell. For infinite cells this is the identity.
    pub fn cartesian(&self, fractional: Vector3D) -> Vector3D {
        if self.is_infinite() {
            return fractional;
        }
        return self.transpose * fractional;
    }

    /// Periodic boundary conditions squared distance between the point `u`
    /// and the point `v`
    pub fn distance2(&self, u: Vector3D, v: Vector3D) -> f64 {
        let mut d = v - u;
        self.vector_image(&mut d);
        return d.norm2();
    }

    /// Periodic boundary conditions distance between the point `u` and the
    /// point `v`
    pub fn distance(&self, u: Vector3D, v: Vector3D) -> f64 {
        return f64::sqrt(self.distance2(u, v));
    }
}

/// Build the lower triangular cell matrix for the given lengths and angles
/// (in degrees)
fn triclinic_matrix(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Matrix3 {
    let cos_alpha = alpha.to_radians().cos();
    let cos_beta = beta.to_radians().cos();
    let (sin_gamma, cos_gamma) = gamma.to_radians().sin_cos();

    let b_x = b * cos_gamma;
    let b_y = b * sin_gamma;

    let c_x = c * cos_beta;
    let c_y = c * (cos_alpha - cos_beta * cos_gamma) / sin_gamma;
    let c_z = f64::sqrt(c * c - c_y * c_y - c_x * c_x);

    return Matrix3::new([
        [a,   0.0, 0.0],
        [b_x, b_y, 0.0],
        [c_x, c_y, c_z],
    ]);
}

/// Get the angle between the vectors `u` and `v`.
fn angle(u: Vector3D, v: Vector3D) -> f64 {
    let un = u.normalized();
    let vn = v.normalized();
    f64::acos(un * vn)
}
