//! Dense row-major matrix used by the sensor geometry.
//!
//! Only the operations the coordinate chain needs are provided: element-wise
//! add / subtract, matrix and scalar products, transpose, identity,
//! Gauss-Jordan inversion and a Gaussian-elimination determinant.  Every
//! shape violation is returned as a [`SeamError`]; nothing panics on bad
//! indices.
//!
//! # Example
//!
//! ```rust
//! use seamtrack_perception::matrix::Matrix;
//!
//! let mut m: Matrix<f64> = Matrix::from_rows(&[vec![4.0, 7.0], vec![2.0, 6.0]]).unwrap();
//! assert!(m.invert_gauss_jordan().unwrap());
//! assert!((m.get(0, 0).unwrap() - 0.6).abs() < 1e-12);
//! ```

use std::fmt;
use std::ops::Mul;

use num_traits::{Float, Num, ToPrimitive};
use seamtrack_types::SeamError;

/// Pivot magnitude below which a matrix is treated as singular.
pub const DEFAULT_EPS: f64 = 1e-12;

/// Scalar types that can be stored in a [`Matrix`].
///
/// `render` controls the canonical text form: reals print with six decimal
/// digits, integers without a decimal point.
pub trait Element: Num + Copy + PartialOrd + ToPrimitive + fmt::Debug {
    fn render(&self) -> String;
}

macro_rules! real_element {
    ($($t:ty),*) => {
        $(impl Element for $t {
            fn render(&self) -> String {
                format!("{:.6}", self)
            }
        })*
    };
}

macro_rules! integer_element {
    ($($t:ty),*) => {
        $(impl Element for $t {
            fn render(&self) -> String {
                self.to_string()
            }
        })*
    };
}

real_element!(f32, f64);
integer_element!(i32, i64);

/// A `rows × cols` matrix backed by a row-major `Vec`.
///
/// `rows * cols == data.len()` holds after every public operation.  Moving
/// out with [`std::mem::take`] leaves an empty `0 × 0` matrix behind.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix<T = f64> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
    eps: f64,
}

impl<T: Element> Default for Matrix<T> {
    fn default() -> Self {
        Self {
            rows: 0,
            cols: 0,
            data: Vec::new(),
            eps: DEFAULT_EPS,
        }
    }
}

impl<T: Element> Matrix<T> {
    /// Zero-filled `rows × cols` matrix.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![T::zero(); rows * cols],
            eps: DEFAULT_EPS,
        }
    }

    /// Zero-filled `n × n` matrix.
    pub fn square(n: usize) -> Self {
        Self::new(n, n)
    }

    /// `n × n` identity matrix.
    pub fn identity(n: usize) -> Self {
        let mut m = Self::default();
        m.make_identity(n);
        m
    }

    /// Build from a row-major buffer.
    ///
    /// # Errors
    ///
    /// [`SeamError::DimensionMismatch`] when `data.len() != rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Result<Self, SeamError> {
        if data.len() != rows * cols {
            return Err(SeamError::dimension("matrix buffer", rows * cols, data.len()));
        }
        Ok(Self {
            rows,
            cols,
            data,
            eps: DEFAULT_EPS,
        })
    }

    /// Build from nested rows.  An empty slice yields an empty matrix.
    ///
    /// # Errors
    ///
    /// [`SeamError::DimensionMismatch`] when the rows are ragged.
    pub fn from_rows(rows: &[Vec<T>]) -> Result<Self, SeamError> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(SeamError::dimension("matrix row", cols, row.len()));
            }
            data.extend_from_slice(row);
        }
        Self::from_vec(rows.len(), cols, data)
    }

    /// Build from a fixed-size array of rows.
    pub fn from_array<const R: usize, const C: usize>(rows: [[T; C]; R]) -> Self {
        Self {
            rows: R,
            cols: C,
            data: rows.into_iter().flatten().collect(),
            eps: DEFAULT_EPS,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Singularity tolerance used by inversion and determinant.
    pub fn eps(&self) -> f64 {
        self.eps
    }

    pub fn set_eps(&mut self, eps: f64) {
        self.eps = eps;
    }

    /// Bounds-checked element read.
    pub fn get(&self, row: usize, col: usize) -> Result<T, SeamError> {
        self.check(row, col)?;
        Ok(self.at(row, col))
    }

    /// Bounds-checked element write.
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<(), SeamError> {
        self.check(row, col)?;
        let idx = row * self.cols + col;
        self.data[idx] = value;
        Ok(())
    }

    /// Replace the whole buffer, keeping the current shape.
    pub fn set_data(&mut self, data: &[T]) -> Result<(), SeamError> {
        if data.len() != self.data.len() {
            return Err(SeamError::dimension("matrix buffer", self.data.len(), data.len()));
        }
        self.data.copy_from_slice(data);
        Ok(())
    }

    /// Row-major view of the elements.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Reshape to `rows × cols`, discarding the contents.
    pub fn resize(&mut self, rows: usize, cols: usize) {
        self.rows = rows;
        self.cols = cols;
        self.data = vec![T::zero(); rows * cols];
    }

    /// Resize in place to `n × n` and fill with the identity.
    pub fn make_identity(&mut self, n: usize) {
        self.resize(n, n);
        for i in 0..n {
            self.data[i * n + i] = T::one();
        }
    }

    pub fn transpose(&self) -> Self {
        let mut out = Self::new(self.cols, self.rows);
        out.eps = self.eps;
        for r in 0..self.rows {
            for c in 0..self.cols {
                out.data[c * self.rows + r] = self.at(r, c);
            }
        }
        out
    }

    /// Element-wise sum.
    pub fn try_add(&self, other: &Self) -> Result<Self, SeamError> {
        self.zip_with(other, "matrix addition", |a, b| a + b)
    }

    /// Element-wise difference.
    pub fn try_sub(&self, other: &Self) -> Result<Self, SeamError> {
        self.zip_with(other, "matrix subtraction", |a, b| a - b)
    }

    /// Matrix product `self · other`.
    ///
    /// # Errors
    ///
    /// [`SeamError::DimensionMismatch`] when `self.cols() != other.rows()`.
    pub fn try_mul(&self, other: &Self) -> Result<Self, SeamError> {
        if self.cols != other.rows {
            return Err(SeamError::dimension("matrix product", self.cols, other.rows));
        }
        let mut out = Self::new(self.rows, other.cols);
        out.eps = self.eps;
        for r in 0..self.rows {
            for c in 0..other.cols {
                let mut acc = T::zero();
                for k in 0..self.cols {
                    acc = acc + self.at(r, k) * other.at(k, c);
                }
                out.data[r * other.cols + c] = acc;
            }
        }
        Ok(out)
    }

    /// Multiply every element by `value`.
    pub fn scale(&self, value: T) -> Self {
        let mut out = self.clone();
        out.data.iter_mut().for_each(|e| *e = *e * value);
        out
    }

    /// Render with `delim` between elements.  With `line_break` each row ends
    /// up on its own line; without it the matrix is flattened.
    pub fn to_text(&self, delim: &str, line_break: bool) -> String {
        let row_sep = if line_break { "\n" } else { delim };
        (0..self.rows)
            .map(|r| self.render_row(r, delim))
            .collect::<Vec<_>>()
            .join(row_sep)
    }

    /// Render a single row.
    pub fn row_text(&self, row: usize, delim: &str) -> Result<String, SeamError> {
        if row >= self.rows {
            return Err(self.out_of_range(row, 0));
        }
        Ok(self.render_row(row, delim))
    }

    /// Render a single column.
    pub fn col_text(&self, col: usize, delim: &str) -> Result<String, SeamError> {
        if col >= self.cols {
            return Err(self.out_of_range(0, col));
        }
        Ok((0..self.rows)
            .map(|r| self.at(r, col).render())
            .collect::<Vec<_>>()
            .join(delim))
    }

    fn render_row(&self, row: usize, delim: &str) -> String {
        self.data[row * self.cols..(row + 1) * self.cols]
            .iter()
            .map(Element::render)
            .collect::<Vec<_>>()
            .join(delim)
    }

    fn zip_with(
        &self,
        other: &Self,
        context: &str,
        op: impl Fn(T, T) -> T,
    ) -> Result<Self, SeamError> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(SeamError::dimension(context, self.data.len(), other.data.len()));
        }
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(&a, &b)| op(a, b))
            .collect();
        Ok(Self {
            rows: self.rows,
            cols: self.cols,
            data,
            eps: self.eps,
        })
    }

    // Caller guarantees the indices are in range.
    fn at(&self, row: usize, col: usize) -> T {
        self.data[row * self.cols + col]
    }

    fn check(&self, row: usize, col: usize) -> Result<(), SeamError> {
        if row >= self.rows || col >= self.cols {
            return Err(self.out_of_range(row, col));
        }
        Ok(())
    }

    fn out_of_range(&self, row: usize, col: usize) -> SeamError {
        SeamError::IndexOutOfRange {
            row,
            col,
            rows: self.rows,
            cols: self.cols,
        }
    }

    fn require_square(&self) -> Result<(), SeamError> {
        if self.rows != self.cols {
            return Err(SeamError::NotSquare {
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(())
    }
}

impl<T: Element + Float> Matrix<T> {
    /// Invert in place by Gauss-Jordan elimination with partial pivoting.
    ///
    /// Returns `Ok(false)` when a pivot falls below [`Matrix::eps`]; the
    /// matrix is left unchanged in that case.
    ///
    /// # Errors
    ///
    /// [`SeamError::NotSquare`] for non-square input.
    pub fn invert_gauss_jordan(&mut self) -> Result<bool, SeamError> {
        self.require_square()?;
        let n = self.rows;
        let tol = self.tolerance();
        let mut a = self.data.clone();
        let mut inv = Self::identity(n).data;

        for k in 0..n {
            let (pivot_row, pivot_abs) = pivot(&a, n, k);
            if pivot_abs < tol {
                return Ok(false);
            }
            if pivot_row != k {
                swap_rows(&mut a, n, k, pivot_row);
                swap_rows(&mut inv, n, k, pivot_row);
            }

            let p = a[k * n + k];
            for c in 0..n {
                a[k * n + c] = a[k * n + c] / p;
                inv[k * n + c] = inv[k * n + c] / p;
            }

            for r in (0..n).filter(|&r| r != k) {
                let factor = a[r * n + k];
                if factor == T::zero() {
                    continue;
                }
                for c in 0..n {
                    a[r * n + c] = a[r * n + c] - factor * a[k * n + c];
                    inv[r * n + c] = inv[r * n + c] - factor * inv[k * n + c];
                }
            }
        }

        self.data = inv;
        Ok(true)
    }

    /// Inverted copy, or `None` when the matrix is singular.
    pub fn inverse(&self) -> Result<Option<Self>, SeamError> {
        let mut out = self.clone();
        Ok(out.invert_gauss_jordan()?.then_some(out))
    }

    /// Determinant by forward Gaussian elimination.  A matrix that turns
    /// singular during elimination has determinant zero.
    pub fn det_gauss(&self) -> Result<T, SeamError> {
        self.require_square()?;
        let n = self.rows;
        let tol = self.tolerance();
        let mut a = self.data.clone();
        let mut det = T::one();

        for k in 0..n {
            let (pivot_row, pivot_abs) = pivot(&a, n, k);
            if pivot_abs < tol {
                return Ok(T::zero());
            }
            if pivot_row != k {
                swap_rows(&mut a, n, k, pivot_row);
                det = -det;
            }

            let p = a[k * n + k];
            det = det * p;
            for r in k + 1..n {
                let factor = a[r * n + k] / p;
                for c in k..n {
                    a[r * n + c] = a[r * n + c] - factor * a[k * n + c];
                }
            }
        }

        Ok(det)
    }

    fn tolerance(&self) -> T {
        T::from(self.eps).unwrap_or_else(T::epsilon)
    }
}

impl<T: Element> Mul<T> for &Matrix<T> {
    type Output = Matrix<T>;

    fn mul(self, value: T) -> Matrix<T> {
        self.scale(value)
    }
}

impl<T: Element> Mul<T> for Matrix<T> {
    type Output = Matrix<T>;

    fn mul(mut self, value: T) -> Matrix<T> {
        self.data.iter_mut().for_each(|e| *e = *e * value);
        self
    }
}

impl<T: Element> fmt::Display for Matrix<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text(",", true))
    }
}

// Row index and magnitude of the largest entry in column `k` at or below the
// diagonal.
fn pivot<T: Float>(a: &[T], n: usize, k: usize) -> (usize, T) {
    (k..n)
        .map(|r| (r, a[r * n + k].abs()))
        .fold((k, T::neg_infinity()), |best, cur| if cur.1 > best.1 { cur } else { best })
}

fn swap_rows<T>(a: &mut [T], n: usize, r1: usize, r2: usize) {
    for c in 0..n {
        a.swap(r1 * n + c, r2 * n + c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_identity(m: &Matrix<f64>, tol: f64) -> bool {
        let n = m.rows();
        (0..n).all(|r| {
            (0..n).all(|c| {
                let expected = if r == c { 1.0 } else { 0.0 };
                (m.get(r, c).unwrap() - expected).abs() < tol
            })
        })
    }

    #[test]
    fn new_matrix_is_zero_filled() {
        let m: Matrix<f64> = Matrix::new(3, 4);
        assert_eq!(m.rows(), 3);
        assert_eq!(m.cols(), 4);
        assert!(m.as_slice().iter().all(|&e| e == 0.0));
        assert_eq!(m.as_slice().len(), 12);
    }

    #[test]
    fn from_rows_keeps_row_major_order() {
        let m = Matrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(m.rows(), 2);
        assert_eq!(m.cols(), 3);
        assert_eq!(m.get(1, 0).unwrap(), 4.0);
        assert_eq!(m.as_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn from_array_matches_from_rows() {
        let a = Matrix::from_array([[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        let b = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = Matrix::from_rows(&[vec![1, 2], vec![3]]).unwrap_err();
        assert!(matches!(err, SeamError::DimensionMismatch { .. }));
    }

    #[test]
    fn from_vec_checks_buffer_length() {
        let m = Matrix::from_vec(2, 3, vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(m.get(1, 2).unwrap(), 6);
        assert!(Matrix::from_vec(2, 2, vec![1, 2, 3, 4, 5, 6]).is_err());
    }

    #[test]
    fn out_of_range_access_is_an_error() {
        let mut m: Matrix<f64> = Matrix::new(2, 2);
        m.set(0, 0, 10.0).unwrap();
        assert_eq!(m.get(0, 0).unwrap(), 10.0);
        assert!(matches!(m.get(2, 0), Err(SeamError::IndexOutOfRange { .. })));
        assert!(m.get(0, 2).is_err());
        assert!(m.set(5, 5, 1.0).is_err());
    }

    #[test]
    fn addition_and_subtraction() {
        let a = Matrix::from_rows(&[vec![1, 2], vec![3, 4]]).unwrap();
        let b = Matrix::from_rows(&[vec![5, 6], vec![7, 8]]).unwrap();
        assert_eq!(a.try_add(&b).unwrap().as_slice(), &[6, 8, 10, 12]);
        assert_eq!(b.try_sub(&a).unwrap().as_slice(), &[4, 4, 4, 4]);
        assert!(a.try_add(&Matrix::new(1, 1)).is_err());
        assert!(a.try_sub(&Matrix::new(2, 3)).is_err());
    }

    #[test]
    fn matrix_product() {
        let a = Matrix::from_rows(&[vec![1, 2], vec![3, 4]]).unwrap();
        let b = Matrix::from_rows(&[vec![2, 0], vec![1, 2]]).unwrap();
        assert_eq!(a.try_mul(&b).unwrap().as_slice(), &[4, 4, 10, 8]);
        assert!(a.try_mul(&Matrix::new(3, 3)).is_err());
    }

    #[test]
    fn scalar_product() {
        let a = Matrix::from_rows(&[vec![1, 2], vec![3, 4]]).unwrap();
        assert_eq!(a.scale(3).as_slice(), &[3, 6, 9, 12]);
        assert_eq!((&a * 3).as_slice(), a.scale(3).as_slice());
        assert_eq!((a * -1).as_slice(), &[-1, -2, -3, -4]);
    }

    #[test]
    fn transpose_swaps_dimensions() {
        let a = Matrix::from_rows(&[vec![1, 2, 3], vec![4, 5, 6]]).unwrap();
        let t = a.transpose();
        assert_eq!(t.rows(), 3);
        assert_eq!(t.cols(), 2);
        assert_eq!(t.as_slice(), &[1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn make_identity_resizes_in_place() {
        let mut m: Matrix<f64> = Matrix::new(1, 5);
        m.make_identity(3);
        assert_eq!(m.rows(), 3);
        assert!(approx_identity(&m, 1e-12));
    }

    #[test]
    fn inversion_times_original_is_identity() {
        let original = Matrix::from_rows(&[vec![4.0, 7.0], vec![2.0, 6.0]]).unwrap();
        let mut inv = original.clone();
        assert!(inv.invert_gauss_jordan().unwrap());
        assert!(approx_identity(&inv.try_mul(&original).unwrap(), 1e-6));
    }

    #[test]
    fn double_inversion_recovers_matrix() {
        let original = Matrix::from_rows(&[
            vec![0.0, 2.0, 1.0, 4.0],
            vec![3.0, -1.0, 2.0, 0.5],
            vec![1.0, 1.0, 5.0, -2.0],
            vec![2.0, 0.0, 1.0, 1.0],
        ])
        .unwrap();
        let mut m = original.clone();
        assert!(m.invert_gauss_jordan().unwrap());
        assert!(approx_identity(&original.try_mul(&m).unwrap(), 1e-6));
        assert!(m.invert_gauss_jordan().unwrap());
        for (a, b) in m.as_slice().iter().zip(original.as_slice()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn singular_inversion_fails_without_touching_matrix() {
        let mut singular = Matrix::from_rows(&[vec![1.0, 2.0], vec![2.0, 4.0]]).unwrap();
        let before = singular.clone();
        assert!(!singular.invert_gauss_jordan().unwrap());
        assert_eq!(singular, before);
        assert!(singular.inverse().unwrap().is_none());
    }

    #[test]
    fn non_square_inversion_and_determinant_are_errors() {
        let mut m: Matrix<f64> = Matrix::new(2, 3);
        assert!(matches!(
            m.invert_gauss_jordan(),
            Err(SeamError::NotSquare { rows: 2, cols: 3 })
        ));
        assert!(m.det_gauss().is_err());
    }

    #[test]
    fn determinant_values() {
        let m = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert!((m.det_gauss().unwrap() + 2.0).abs() < 1e-6);

        let m = Matrix::from_rows(&[
            vec![2.0, -1.0, 0.0],
            vec![-1.0, 2.0, -1.0],
            vec![0.0, -1.0, 2.0],
        ])
        .unwrap();
        assert!((m.det_gauss().unwrap() - 4.0).abs() < 1e-6);

        let singular = Matrix::from_rows(&[vec![1.0, 2.0], vec![2.0, 4.0]]).unwrap();
        assert_eq!(singular.det_gauss().unwrap(), 0.0);
    }

    #[test]
    fn determinant_sign_follows_row_swaps() {
        let m = Matrix::from_rows(&[vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();
        assert!((m.det_gauss().unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn real_text_rendering() {
        let m = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(m.to_string(), "1.000000,2.000000\n3.000000,4.000000");
        assert_eq!(m.to_text(";", false), "1.000000;2.000000;3.000000;4.000000");
        assert_eq!(m.row_text(0, ",").unwrap(), "1.000000,2.000000");
        assert_eq!(m.col_text(1, ",").unwrap(), "2.000000,4.000000");
        assert!(m.row_text(2, ",").is_err());
    }

    #[test]
    fn integer_text_rendering() {
        let m = Matrix::from_rows(&[vec![1, 2], vec![3, 4]]).unwrap();
        assert_eq!(m.to_string(), "1,2\n3,4");
        assert_eq!(m.to_text(";", false), "1;2;3;4");
        assert_eq!(m.row_text(0, ";").unwrap(), "1;2");
        assert_eq!(m.col_text(1, " ").unwrap(), "2 4");
    }

    #[test]
    fn clone_is_deep_and_take_leaves_empty() {
        let mut a = Matrix::from_rows(&[vec![1, 2], vec![3, 4]]).unwrap();
        let b = a.clone();
        a.set(0, 0, 10).unwrap();
        assert_eq!(b.get(0, 0).unwrap(), 1);

        let moved = std::mem::take(&mut a);
        assert_eq!(moved.get(0, 0).unwrap(), 10);
        assert_eq!(a.rows(), 0);
        assert!(a.is_empty());
    }

    #[test]
    fn set_data_checks_length() {
        let mut m: Matrix<i32> = Matrix::new(2, 2);
        m.set_data(&[1, 2, 3, 4]).unwrap();
        assert_eq!(m.clone().into_vec(), vec![1, 2, 3, 4]);
        assert!(m.set_data(&[1, 2, 3]).is_err());
    }

    #[test]
    fn custom_eps_changes_singularity_threshold() {
        let mut m = Matrix::from_rows(&[vec![1e-6, 0.0], vec![0.0, 1.0]]).unwrap();
        m.set_eps(1e-3);
        assert!(!m.clone().invert_gauss_jordan().unwrap());
        assert_eq!(m.det_gauss().unwrap(), 0.0);
        m.set_eps(DEFAULT_EPS);
        assert!(m.invert_gauss_jordan().unwrap());
    }
}
