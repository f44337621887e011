/// Check that two float statistics agree to within a relative tolerance (5e-5 unless given), measured against the
/// larger magnitude. Exact equality always passes, so two zero means compare equal.
#[macro_export]
macro_rules! assert_floats_near_equal {
    ($left:expr, $right:expr, $msg:expr) => {
        assert_floats_near_equal!($left, $right, 5e-5, $msg)
    };
    ($left:expr, $right:expr, $tolerance:expr, $msg:expr) => {{
        let left: f64 = $left;
        let right: f64 = $right;
        let scale = left.abs().max(right.abs());
        let relative = if left == right { 0.0 } else { (left - right).abs() / scale };
        assert!(relative <= $tolerance, "{}: {} vs {} (relative difference {})", $msg, left, right, relative);
    }};
}
