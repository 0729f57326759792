//! Shared math helpers for the virtual grid frame.
//!
//! The grid frame measures headings in degrees, counter-clockwise, with
//! 0° pointing along +x. All pose conversions compose these primitives.

/// Normalize an angle in degrees to `[0, 360)`.
///
/// Uses a true modulo, so negative input wraps correctly
/// (`normalize_ang360(-90.0) == 270.0`).
#[inline]
pub fn normalize_ang360(angle: f32) -> f32 {
    let a = angle.rem_euclid(360.0);
    // rem_euclid can round a tiny negative input up to exactly 360.0
    if a >= 360.0 { 0.0 } else { a }
}

/// Rotate a point `(x, y)` about the origin by `degrees` counter-clockwise.
#[inline]
pub fn rotate_point(x: f32, y: f32, degrees: f32) -> (f32, f32) {
    let (sin, cos) = degrees.to_radians().sin_cos();
    (x * cos - y * sin, x * sin + y * cos)
}

/// Quantize a heading into the unit grid step the robot is facing.
///
/// Sectors: `[-45°, 45°) -> +x`, `[45°, 135°) -> +y`, `[135°, 225°) -> -x`,
/// `[225°, 315°) -> -y`. The first sector spans the 360/0 wraparound.
#[inline]
pub fn heading_to_grid_step(theta: f32) -> (i32, i32) {
    let t = normalize_ang360(theta);
    if t < 45.0 || t >= 315.0 {
        (1, 0)
    } else if t < 135.0 {
        (0, 1)
    } else if t < 225.0 {
        (-1, 0)
    } else {
        (0, -1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_range_and_negatives() {
        assert_eq!(normalize_ang360(0.0), 0.0);
        assert_eq!(normalize_ang360(360.0), 0.0);
        assert_eq!(normalize_ang360(450.0), 90.0);
        assert_eq!(normalize_ang360(-90.0), 270.0);
        assert_eq!(normalize_ang360(-720.0), 0.0);

        for a in [-1234.5f32, -0.25, 0.0, 17.0, 359.9, 3600.1] {
            let n = normalize_ang360(a);
            assert!((0.0..360.0).contains(&n), "{} -> {}", a, n);
        }
    }

    #[test]
    fn test_normalize_idempotent() {
        for a in [-540.0f32, -1e-7, 42.0, 359.999, 1000.0] {
            let once = normalize_ang360(a);
            assert_eq!(normalize_ang360(once), once);
        }
    }

    #[test]
    fn test_rotate_round_trip() {
        for theta in [0.0f32, 30.0, 90.0, 137.0, 270.0, -45.0] {
            let (rx, ry) = rotate_point(3.0, -2.0, theta);
            let (x, y) = rotate_point(rx, ry, -theta);
            assert!((x - 3.0).abs() < 1e-4, "theta={}: x={}", theta, x);
            assert!((y + 2.0).abs() < 1e-4, "theta={}: y={}", theta, y);
        }
    }

    #[test]
    fn test_rotate_quarter_turn() {
        let (x, y) = rotate_point(1.0, 0.0, 90.0);
        assert!(x.abs() < 1e-6);
        assert!((y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_heading_sectors() {
        assert_eq!(heading_to_grid_step(0.0), (1, 0));
        assert_eq!(heading_to_grid_step(44.9), (1, 0));
        assert_eq!(heading_to_grid_step(315.0), (1, 0));
        assert_eq!(heading_to_grid_step(359.9), (1, 0));
        assert_eq!(heading_to_grid_step(45.0), (0, 1));
        assert_eq!(heading_to_grid_step(90.0), (0, 1));
        assert_eq!(heading_to_grid_step(135.0), (-1, 0));
        assert_eq!(heading_to_grid_step(180.0), (-1, 0));
        assert_eq!(heading_to_grid_step(225.0), (0, -1));
        assert_eq!(heading_to_grid_step(270.0), (0, -1));
        // negative input goes through normalization
        assert_eq!(heading_to_grid_step(-90.0), (0, -1));
    }

    #[test]
    fn test_heading_sectors_total() {
        // Every heading maps to exactly one of the four unit steps.
        let mut deg = 0.0f32;
        while deg < 360.0 {
            let step = heading_to_grid_step(deg);
            assert!(
                [(1, 0), (0, 1), (-1, 0), (0, -1)].contains(&step),
                "no sector for {}",
                deg
            );
            deg += 0.5;
        }
    }
}
