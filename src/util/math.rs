//! Math type re-exports and map-projection transform helpers.
//!
//! The projection builds a 3×3 transform step by step. Every step
//! left-multiplies the accumulated matrix, so the first operation applied
//! is the first one a point sees. Matrices are written row-major here and
//! stored column-major by `glam`.

pub use glam::{DMat3, DVec3, IVec3, Vec3};

/// Build a matrix from rows.
#[inline]
pub fn mat3_from_rows(rows: [[f64; 3]; 3]) -> DMat3 {
    DMat3::from_cols_array_2d(&rows).transpose()
}

/// Accumulating 3×3 transform (`self = op * self` for each operation).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform3 {
    matrix: DMat3,
}

impl Default for Transform3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform3 {
    /// Identity transform.
    pub const fn identity() -> Self {
        Self { matrix: DMat3::IDENTITY }
    }

    /// Accumulated matrix.
    #[inline]
    pub fn matrix(&self) -> DMat3 {
        self.matrix
    }

    /// Apply `op` after everything accumulated so far.
    #[inline]
    pub fn multiply(&mut self, op: DMat3) -> &mut Self {
        self.matrix = op * self.matrix;
        self
    }

    /// Per-axis scale.
    pub fn scale(&mut self, sx: f64, sy: f64, sz: f64) -> &mut Self {
        self.multiply(DMat3::from_diagonal(DVec3::new(sx, sy, sz)))
    }

    /// Shear X and Y by a factor of Z.
    pub fn shear_z(&mut self, x_fact: f64, y_fact: f64) -> &mut Self {
        self.multiply(mat3_from_rows([
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [x_fact, y_fact, 1.0],
        ]))
    }

    /// Rotate in the XY plane, clockwise around +Z, by degrees.
    pub fn rotate_xy(&mut self, degrees: f64) -> &mut Self {
        let (s, c) = degrees.to_radians().sin_cos();
        self.multiply(mat3_from_rows([
            [c, s, 0.0],
            [-s, c, 0.0],
            [0.0, 0.0, 1.0],
        ]))
    }

    /// Rotate in the YZ plane, clockwise around +X, by degrees.
    pub fn rotate_yz(&mut self, degrees: f64) -> &mut Self {
        let (s, c) = degrees.to_radians().sin_cos();
        self.multiply(mat3_from_rows([
            [1.0, 0.0, 0.0],
            [0.0, c, s],
            [0.0, -s, c],
        ]))
    }

    /// Transform a point.
    #[inline]
    pub fn transform(&self, v: DVec3) -> DVec3 {
        self.matrix * v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: DVec3, b: DVec3) -> bool {
        (a - b).abs().max_element() < 1e-12
    }

    #[test]
    fn test_rows_layout() {
        let m = mat3_from_rows([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);
        assert_eq!(m * DVec3::X, DVec3::new(1.0, 4.0, 7.0));
    }

    #[test]
    fn test_operation_order() {
        // scale first, then shear: x is scaled before it feeds z
        let mut t = Transform3::identity();
        t.scale(2.0, 1.0, 1.0).shear_z(1.0, 0.0);
        assert!(approx(t.transform(DVec3::X), DVec3::new(2.0, 0.0, 2.0)));

        let mut t = Transform3::identity();
        t.shear_z(0.0, 0.0).multiply(mat3_from_rows([
            [0.0, -1.0, 0.0],
            [0.0, 0.0, 1.0],
            [-1.0, 0.0, 0.0],
        ]));
        assert!(approx(t.transform(DVec3::new(1.0, 2.0, 3.0)), DVec3::new(-2.0, 3.0, -1.0)));
    }

    #[test]
    fn test_rotation_xy() {
        let mut t = Transform3::identity();
        t.rotate_xy(90.0);
        assert!(approx(t.transform(DVec3::X), DVec3::new(0.0, -1.0, 0.0)));
    }
}
