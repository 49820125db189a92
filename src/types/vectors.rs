use std::ops::{Add, AddAssign, BitXor, Div, Index, IndexMut, Mul, Neg, Sub, SubAssign};

use approx::{AbsDiffEq, RelativeEq, UlpsEq};

/// A 3-dimensional vector with `f64` components.
///
/// Supports the usual arithmetic operations; like the rest of this crate it
/// uses `*` between two vectors for the scalar product and `^` for the cross
/// product.
///
/// ```
/// use minimage::Vector3D;
///
/// let u = Vector3D::new(1.0, 0.0, 0.0);
/// let v = Vector3D::new(0.0, 1.0, 0.0);
///
/// assert_eq!(u * v, 0.0);
/// assert_eq!(u ^ v, Vector3D::new(0.0, 0.0, 1.0));
/// assert_eq!((u + v).norm2(), 2.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3D([f64; 3]);

impl Vector3D {
    /// Create a new `Vector3D` with components `x`, `y`, `z`
    #[inline]
    pub fn new(x: f64, y: f64, z: f64) -> Vector3D {
        return Vector3D([x, y, z]);
    }

    /// Create a vector with all components set to zero
    #[inline]
    pub fn zero() -> Vector3D {
        return Vector3D([0.0, 0.0, 0.0]);
    }

    /// Get the squared euclidean norm of this vector
    #[inline]
    pub fn norm2(&self) -> f64 {
        return self * self;
    }

    /// Get the euclidean norm of this vector
    #[inline]
    pub fn norm(&self) -> f64 {
        return f64::sqrt(self.norm2());
    }

    /// Get a unit vector with the same direction as this vector
    #[inline]
    pub fn normalized(&self) -> Vector3D {
        return self / self.norm();
    }
}

impl_binary_op!(Vector3D, Vector3D, Add, add, Vector3D, self, other,
    Vector3D::new(self[0] + other[0], self[1] + other[1], self[2] + other[2])
);

impl_binary_op!(Vector3D, Vector3D, Sub, sub, Vector3D, self, other,
    Vector3D::new(self[0] - other[0], self[1] - other[1], self[2] - other[2])
);

// scalar product
impl_binary_op!(Vector3D, Vector3D, Mul, mul, f64, self, other,
    self[0] * other[0] + self[1] * other[1] + self[2] * other[2]
);

// cross product
impl_binary_op!(Vector3D, Vector3D, BitXor, bitxor, Vector3D, self, other,
    Vector3D::new(
        self[1] * other[2] - self[2] * other[1],
        self[2] * other[0] - self[0] * other[2],
        self[0] * other[1] - self[1] * other[0],
    )
);

impl_assign_op!(Vector3D, Vector3D, AddAssign, add_assign, self, other, {
    self.0[0] += other[0];
    self.0[1] += other[1];
    self.0[2] += other[2];
});

impl_assign_op!(Vector3D, Vector3D, SubAssign, sub_assign, self, other, {
    self.0[0] -= other[0];
    self.0[1] -= other[1];
    self.0[2] -= other[2];
});

impl_scalar_rhs_op!(Vector3D, Mul, mul, Vector3D, self, scalar,
    Vector3D::new(scalar * self[0], scalar * self[1], scalar * self[2])
);

impl_scalar_rhs_op!(Vector3D, Div, div, Vector3D, self, scalar,
    Vector3D::new(self[0] / scalar, self[1] / scalar, self[2] / scalar)
);

impl_scalar_lhs_op!(Vector3D, Mul, mul, Vector3D, self, vector,
    Vector3D::new(self * vector[0], self * vector[1], self * vector[2])
);

impl Neg for Vector3D {
    type Output = Vector3D;
    #[inline]
    fn neg(self) -> Vector3D {
        return Vector3D::new(-self[0], -self[1], -self[2]);
    }
}

impl<'a> Neg for &'a Vector3D {
    type Output = Vector3D;
    #[inline]
    fn neg(self) -> Vector3D {
        return Vector3D::new(-self[0], -self[1], -self[2]);
    }
}

impl Index<usize> for Vector3D {
    type Output = f64;
    #[inline]
    fn index(&self, index: usize) -> &f64 {
        return &self.0[index];
    }
}

impl IndexMut<usize> for Vector3D {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut f64 {
        return &mut self.0[index];
    }
}

impl From<[f64; 3]> for Vector3D {
    fn from(array: [f64; 3]) -> Vector3D {
        return Vector3D(array);
    }
}

impl From<Vector3D> for [f64; 3] {
    fn from(vector: Vector3D) -> [f64; 3] {
        return vector.0;
    }
}

impl AbsDiffEq for Vector3D {
    type Epsilon = <f64 as AbsDiffEq>::Epsilon;

    fn default_epsilon() -> Self::Epsilon {
        return f64::default_epsilon();
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        return f64::abs_diff_eq(&self[0], &other[0], epsilon)
            && f64::abs_diff_eq(&self[1], &other[1], epsilon)
            && f64::abs_diff_eq(&self[2], &other[2], epsilon);
    }
}

impl RelativeEq for Vector3D {
    fn default_max_relative() -> Self::Epsilon {
        return f64::default_max_relative();
    }

    fn relative_eq(&self, other: &Self, epsilon: Self::Epsilon, max_relative: Self::Epsilon) -> bool {
        return f64::relative_eq(&self[0], &other[0], epsilon, max_relative)
            && f64::relative_eq(&self[1], &other[1], epsilon, max_relative)
            && f64::relative_eq(&self[2], &other[2], epsilon, max_relative);
    }
}

impl UlpsEq for Vector3D {
    fn default_max_ulps() -> u32 {
        return f64::default_max_ulps();
    }

    fn ulps_eq(&self, other: &Self, epsilon: Self::Epsilon, max_ulps: u32) -> bool {
        return f64::ulps_eq(&self[0], &other[0], epsilon, max_ulps)
            && f64::ulps_eq(&self[1], &other[1], epsilon, max_ulps)
            && f64::ulps_eq(&self[2], &other[2], epsilon, max_ulps);
    }
}
