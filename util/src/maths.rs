//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where 
    T: Float 
{
    target_range.0 
        + ((value - source_range.0) 
        * (target_range.1 - target_range.0) 
        / (source_range.1 - source_range.0))
}

/// Apply polynomial coefficients to a value.
///
/// The coefficients are ordered lowest power first, i.e. if there are 3 
/// coefficients the result is `c[0] + c[1]*x + c[2]*x^2`.
pub fn poly_val<T>(value: T, coeffs: &[T]) -> T
where
    T: Float
{
    // Horner's method, starting from the highest power
    coeffs.iter()
        .rev()
        .fold(T::zero(), |acc, c| acc * value + *c)
}

/// Evaluate the first derivative of a polynomial at a value.
///
/// Coefficients are ordered lowest power first, as in [`poly_val`].
pub fn poly_deriv<T>(value: T, coeffs: &[T]) -> T
where
    T: Float
{
    let mut res = T::zero();

    for (i, c) in coeffs.iter().enumerate().skip(1).rev() {
        res = res * value + *c * from_usize(i);
    }

    res
}

/// Evaluate the second derivative of a polynomial at a value.
///
/// Coefficients are ordered lowest power first, as in [`poly_val`].
pub fn poly_deriv2<T>(value: T, coeffs: &[T]) -> T
where
    T: Float
{
    let mut res = T::zero();

    for (i, c) in coeffs.iter().enumerate().skip(2).rev() {
        res = res * value + *c * from_usize(i * (i - 1));
    }

    res
}

fn from_usize<T: Float>(value: usize) -> T {
    T::from(value).unwrap_or_else(T::nan)
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_lin_map() {
        assert_eq!(lin_map((-0.5f64, 0.5), (-1.0, 1.0), 0.25), 0.5);
        assert_eq!(lin_map((0f64, 10.0), (0.0, 1.0), 5.0), 0.5);
    }

    #[test]
    fn test_poly() {
        // 1 + 2x - 3x^2 + 0.5x^3
        let coeffs = [1.0f64, 2.0, -3.0, 0.5];

        assert_eq!(poly_val(0.0, &coeffs), 1.0);
        assert_abs_diff_eq!(poly_val(2.0, &coeffs), 1.0 + 4.0 - 12.0 + 4.0);
        assert_abs_diff_eq!(poly_deriv(2.0, &coeffs), 2.0 - 12.0 + 6.0);
        assert_abs_diff_eq!(poly_deriv2(2.0, &coeffs), -6.0 + 6.0);

        // Derivative at zero is exactly the linear coefficient
        assert_eq!(poly_deriv(0.0, &coeffs), 2.0);

        // Degenerate polynomials
        assert_eq!(poly_val(3.0, &[] as &[f64]), 0.0);
        assert_eq!(poly_deriv(3.0, &[4.0f64]), 0.0);
        assert_eq!(poly_deriv2(3.0, &[4.0f64, 1.0]), 0.0);
    }
}
