use std::ops::{Index, IndexMut, Mul};

use crate::types::Vector3D;

/// A 3x3 square matrix with `f64` components, stored row-major. Rows are
/// accessible by indexing: `matrix[i]` is the i-th row, `matrix[i][j]` the
/// component at row `i` and column `j`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix3([[f64; 3]; 3]);

impl Matrix3 {
    /// Create a new `Matrix3` from the given rows
    #[inline]
    pub fn new(rows: [[f64; 3]; 3]) -> Matrix3 {
        return Matrix3(rows);
    }

    /// Create a matrix with all components set to zero
    #[inline]
    pub fn zero() -> Matrix3 {
        return Matrix3([[0.0; 3]; 3]);
    }

    /// Create the identity matrix
    #[inline]
    pub fn one() -> Matrix3 {
        return Matrix3([
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ]);
    }

    /// Compute the determinant of this matrix
    pub fn determinant(&self) -> f64 {
        let m = &self.0;
        return m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
             - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
             + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0]);
    }

    /// Compute the inverse of this matrix.
    ///
    /// # Panics
    ///
    /// If the matrix is not invertible (null determinant)
    pub fn inverse(&self) -> Matrix3 {
        let determinant = self.determinant();
        assert!(determinant != 0.0, "can not invert a matrix with null determinant");

        let m = &self.0;
        let inverse = 1.0 / determinant;
        return Matrix3([
            [
                inverse * (m[1][1] * m[2][2] - m[1][2] * m[2][1]),
                inverse * (m[0][2] * m[2][1] - m[0][1] * m[2][2]),
                inverse * (m[0][1] * m[1][2] - m[0][2] * m[1][1]),
            ],
            [
                inverse * (m[1][2] * m[2][0] - m[1][0] * m[2][2]),
                inverse * (m[0][0] * m[2][2] - m[0][2] * m[2][0]),
                inverse * (m[0][2] * m[1][0] - m[0][0] * m[1][2]),
            ],
            [
                inverse * (m[1][0] * m[2][1] - m[1][1] * m[2][0]),
                inverse * (m[0][1] * m[2][0] - m[0][0] * m[2][1]),
                inverse * (m[0][0] * m[1][1] - m[0][1] * m[1][0]),
            ],
        ]);
    }

    /// Get the transpose of this matrix
    pub fn transposed(&self) -> Matrix3 {
        let m = &self.0;
        return Matrix3([
            [m[0][0], m[1][0], m[2][0]],
            [m[0][1], m[1][1], m[2][1]],
            [m[0][2], m[1][2], m[2][2]],
        ]);
    }
}

// matrix-vector product
impl_binary_op!(Matrix3, Vector3D, Mul, mul, Vector3D, self, vector,
    Vector3D::new(
        self[0][0] * vector[0] + self[0][1] * vector[1] + self[0][2] * vector[2],
        self[1][0] * vector[0] + self[1][1] * vector[1] + self[1][2] * vector[2],
        self[2][0] * vector[0] + self[2][1] * vector[1] + self[2][2] * vector[2],
    )
);

// matrix-matrix product
impl_binary_op!(Matrix3, Matrix3, Mul, mul, Matrix3, self, other, {
    let mut result = Matrix3::zero();
    for i in 0..3 {
        for j in 0..3 {
            result[i][j] = self[i][0] * other[0][j]
                         + self[i][1] * other[1][j]
                         + self[i][2] * other[2][j];
        }
    }
    result
});

impl Index<usize> for Matrix3 {
    type Output = [f64; 3];
    #[inline]
    fn index(&self, index: usize) -> &[f64; 3] {
        return &self.0[index];
    }
}

impl IndexMut<usize> for Matrix3 {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut [f64; 3] {
        return &mut self.0[index];
    }
}

impl From<[[f64; 3]; 3]> for Matrix3 {
    fn from(rows: [[f64; 3]; 3]) -> Matrix3 {
        return Matrix3(rows);
    }
}
