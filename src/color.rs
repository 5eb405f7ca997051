//! CPU mirror of the transfer functions applied at the end of the main pass.
//!
//! The tone curve matches `renderer/shader/pbr_lighting.wgsl` exactly. For
//! the sRGB encode the shader uses the pow(1/2.2) gamma approximation while
//! this copy keeps the exact piecewise curve; both are monotone and fix the
//! same endpoints, which is what the device-free tests here rely on.

use glam::Vec3;

/// Linear exposure, applied before tone mapping.
pub fn apply_exposure(color: Vec3, exposure: f32) -> Vec3 {
    color * exposure.max(0.0)
}

/// ACES filmic approximation (Narkowicz 2015 fit).
///
/// Monotonically increasing on non-negative input and maps 0 to 0.
pub fn aces_tonemap(x: f32) -> f32 {
    const A: f32 = 2.51;
    const B: f32 = 0.03;
    const C: f32 = 2.43;
    const D: f32 = 0.59;
    const E: f32 = 0.14;
    let x = x.max(0.0);
    ((x * (A * x + B)) / (x * (C * x + D) + E)).clamp(0.0, 1.0)
}

pub fn aces_tonemap_rgb(color: Vec3) -> Vec3 {
    Vec3::new(
        aces_tonemap(color.x),
        aces_tonemap(color.y),
        aces_tonemap(color.z),
    )
}

/// Linear to sRGB encode for presentation on a non-sRGB surface format.
pub fn linear_to_srgb(x: f32) -> f32 {
    let x = x.clamp(0.0, 1.0);
    if x <= 0.003_130_8 {
        12.92 * x
    } else {
        1.055 * x.powf(1.0 / 2.4) - 0.055
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tonemap_maps_zero_to_zero() {
        assert_eq!(aces_tonemap(0.0), 0.0);
    }

    #[test]
    fn tonemap_is_non_decreasing() {
        let mut prev = aces_tonemap(0.0);
        for i in 1..=10_000 {
            let x = i as f32 * 0.01;
            let y = aces_tonemap(x);
            assert!(y >= prev, "tone curve decreased at x = {x}");
            prev = y;
        }
    }

    #[test]
    fn tonemap_stays_in_unit_range() {
        for x in [0.5f32, 1.0, 4.0, 100.0, 1.0e6] {
            let y = aces_tonemap(x);
            assert!((0.0..=1.0).contains(&y));
        }
    }

    #[test]
    fn srgb_encode_endpoints() {
        assert_eq!(linear_to_srgb(0.0), 0.0);
        assert!((linear_to_srgb(1.0) - 1.0).abs() < 1.0e-6);
    }
}
