//! Small dense block kernels
//!
//! Blocks are row-major slices of length `n * n`. Inversion uses closed forms for
//! `n <= 4` and in-place Gauss-Jordan elimination without pivoting above that. Only the
//! scalar case guards against a vanishing pivot (the inverse becomes zero); larger
//! singular blocks produce non-finite entries and it is up to the caller to avoid them.

use crate::traits::ComplexField;

/// Overwrite the row-major `n x n` block with its inverse
pub fn invert_in_place<T: ComplexField>(a: &mut [T], n: usize) {
    debug_assert_eq!(a.len(), n * n);
    match n {
        0 => {}
        1 => a[0] = scalar_inverse(a[0]),
        2 => invert_2x2(a),
        3 => invert_3x3(a),
        4 => invert_4x4(a),
        _ => gauss_jordan(a, n),
    }
}

/// `1 / a`, or zero when `|a|` is below the smallest positive normal real
#[inline]
pub fn scalar_inverse<T: ComplexField>(a: T) -> T {
    if a.norm() > T::tiny() {
        a.inv()
    } else {
        T::zero()
    }
}

fn invert_2x2<T: ComplexField>(a: &mut [T]) {
    let (a11, a12, a21, a22) = (a[0], a[1], a[2], a[3]);
    let det_inv = (a11 * a22 - a12 * a21).inv();
    a[0] = a22 * det_inv;
    a[1] = -a12 * det_inv;
    a[2] = -a21 * det_inv;
    a[3] = a11 * det_inv;
}

fn invert_3x3<T: ComplexField>(a: &mut [T]) {
    let m = |r: usize, c: usize| a[3 * r + c];

    // Cofactors of the first row give the determinant
    let c00 = m(1, 1) * m(2, 2) - m(1, 2) * m(2, 1);
    let c01 = m(1, 2) * m(2, 0) - m(1, 0) * m(2, 2);
    let c02 = m(1, 0) * m(2, 1) - m(1, 1) * m(2, 0);
    let det_inv = (m(0, 0) * c00 + m(0, 1) * c01 + m(0, 2) * c02).inv();

    let inv = [
        c00,
        m(0, 2) * m(2, 1) - m(0, 1) * m(2, 2),
        m(0, 1) * m(1, 2) - m(0, 2) * m(1, 1),
        c01,
        m(0, 0) * m(2, 2) - m(0, 2) * m(2, 0),
        m(0, 2) * m(1, 0) - m(0, 0) * m(1, 2),
        c02,
        m(0, 1) * m(2, 0) - m(0, 0) * m(2, 1),
        m(0, 0) * m(1, 1) - m(0, 1) * m(1, 0),
    ];
    for (dst, v) in a.iter_mut().zip(inv) {
        *dst = v * det_inv;
    }
}

/// Laplace expansion along the first two rows: the 2x2 minors of rows 0-1 (`s`) pair with
/// the complementary minors of rows 2-3 (`c`).
fn invert_4x4<T: ComplexField>(a: &mut [T]) {
    let m = |r: usize, c: usize| a[4 * r + c];
    let minor = |r0: usize, r1: usize, c0: usize, c1: usize| {
        m(r0, c0) * m(r1, c1) - m(r1, c0) * m(r0, c1)
    };

    let s = [
        minor(0, 1, 0, 1),
        minor(0, 1, 0, 2),
        minor(0, 1, 0, 3),
        minor(0, 1, 1, 2),
        minor(0, 1, 1, 3),
        minor(0, 1, 2, 3),
    ];
    let c = [
        minor(2, 3, 0, 1),
        minor(2, 3, 0, 2),
        minor(2, 3, 0, 3),
        minor(2, 3, 1, 2),
        minor(2, 3, 1, 3),
        minor(2, 3, 2, 3),
    ];

    let det = s[0] * c[5] - s[1] * c[4] + s[2] * c[3] + s[3] * c[2] - s[4] * c[1] + s[5] * c[0];
    let d = det.inv();

    let inv = [
        (m(1, 1) * c[5] - m(1, 2) * c[4] + m(1, 3) * c[3]) * d,
        (-m(0, 1) * c[5] + m(0, 2) * c[4] - m(0, 3) * c[3]) * d,
        (m(3, 1) * s[5] - m(3, 2) * s[4] + m(3, 3) * s[3]) * d,
        (-m(2, 1) * s[5] + m(2, 2) * s[4] - m(2, 3) * s[3]) * d,
        (-m(1, 0) * c[5] + m(1, 2) * c[2] - m(1, 3) * c[1]) * d,
        (m(0, 0) * c[5] - m(0, 2) * c[2] + m(0, 3) * c[1]) * d,
        (-m(3, 0) * s[5] + m(3, 2) * s[2] - m(3, 3) * s[1]) * d,
        (m(2, 0) * s[5] - m(2, 2) * s[2] + m(2, 3) * s[1]) * d,
        (m(1, 0) * c[4] - m(1, 1) * c[2] + m(1, 3) * c[0]) * d,
        (-m(0, 0) * c[4] + m(0, 1) * c[2] - m(0, 3) * c[0]) * d,
        (m(3, 0) * s[4] - m(3, 1) * s[2] + m(3, 3) * s[0]) * d,
        (-m(2, 0) * s[4] + m(2, 1) * s[2] - m(2, 3) * s[0]) * d,
        (-m(1, 0) * c[3] + m(1, 1) * c[1] - m(1, 2) * c[0]) * d,
        (m(0, 0) * c[3] - m(0, 1) * c[1] + m(0, 2) * c[0]) * d,
        (-m(3, 0) * s[3] + m(3, 1) * s[1] - m(3, 2) * s[0]) * d,
        (m(2, 0) * s[3] - m(2, 1) * s[1] + m(2, 2) * s[0]) * d,
    ];
    a.copy_from_slice(&inv);
}

/// In-place Gauss-Jordan inversion, pivots taken on the diagonal in order
fn gauss_jordan<T: ComplexField>(a: &mut [T], n: usize) {
    for k in 0..n {
        let alinv = a[k * n + k].inv();

        for j in (0..n).filter(|&j| j != k) {
            a[k * n + j] *= alinv;
        }
        for i in (0..n).filter(|&i| i != k) {
            let aik = a[i * n + k];
            for j in (0..n).filter(|&j| j != k) {
                let akj = a[k * n + j];
                a[i * n + j] -= aik * akj;
            }
        }
        for i in (0..n).filter(|&i| i != k) {
            a[i * n + k] = -a[i * n + k] * alinv;
        }
        a[k * n + k] = alinv;
    }
}

/// `y += B x` for a row-major `n x n` block
#[inline]
pub fn block_matvec_add<T: ComplexField>(block: &[T], n: usize, x: &[T], y: &mut [T]) {
    for (i, yi) in y.iter_mut().enumerate().take(n) {
        let row = &block[i * n..(i + 1) * n];
        *yi += row.iter().zip(x).fold(T::zero(), |acc, (&b, &v)| acc + b * v);
    }
}
