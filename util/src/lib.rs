/// Poor man's approx assertion for matrices
#[macro_export]
macro_rules! assert_approx_matrix_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let diff = $x - $y;

        let max_absdiff = diff.abs().max();
        let approx_eq = max_absdiff <= $tol;

        if !approx_eq {
            println!("abstol: {:e}", $tol);
            println!("left: {}", $x);
            println!("right: {}", $y);
            println!("diff: {:e}", diff);
        }
        assert!(approx_eq);
    }};
}

/// Asserts that an `f64` lies within `abstol` of the expected value.
#[macro_export]
macro_rules! assert_approx_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let (x, y): (f64, f64) = ($x, $y);
        if (x - y).abs() > $tol {
            panic!("assert_approx_eq!({}, {}) failed: |{} - {}| > {:e}", stringify!($x), stringify!($y), x, y, $tol);
        }
    }};
}
