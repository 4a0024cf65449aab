//! Pure camera arithmetic shared by the controller commands.

use crate::config::CameraConfig;
use crate::models::{CameraOptions, CameraState, GeoPoint};

const TIER_EPSILON: f64 = 0.5;

/// Target for a zoom step of `direction` (+1 or -1) increments.
///
/// Pitch follows zoom linearly so the map tilts as it zooms in.
pub fn zoom_target(config: &CameraConfig, camera: CameraState, direction: f64) -> CameraOptions {
    let zoom = (camera.zoom + direction * config.zoom_step).clamp(config.min_zoom, config.max_zoom);
    let span = config.max_zoom - config.min_zoom;
    let pitch = if span > 0.0 {
        (config.max_pitch * (zoom - config.min_zoom) / span).clamp(0.0, config.max_pitch)
    } else {
        camera.pitch
    };

    CameraOptions::default().with_zoom(zoom).with_pitch(pitch)
}

/// Target for a rotation of `direction` (+1 or -1) bearing increments.
pub fn rotate_target(config: &CameraConfig, camera: CameraState, direction: f64) -> CameraOptions {
    let bearing = (camera.bearing + direction * config.bearing_step).rem_euclid(360.0);
    CameraOptions::default().with_bearing(bearing)
}

/// Next pitch tier above the current pitch, or the highest tier.
pub fn raise_pitch(config: &CameraConfig, current: f64) -> f64 {
    let highest = config.pitch_tiers.iter().copied().fold(f64::MIN, f64::max);
    config
        .pitch_tiers
        .iter()
        .copied()
        .filter(|tier| *tier > current + TIER_EPSILON)
        .fold(None, |best: Option<f64>, tier| Some(best.map_or(tier, |b| b.min(tier))))
        .unwrap_or(highest)
        .min(config.max_pitch)
}

/// Next pitch tier below the current pitch, or the lowest tier.
pub fn lower_pitch(config: &CameraConfig, current: f64) -> f64 {
    let lowest = config.pitch_tiers.iter().copied().fold(f64::MAX, f64::min);
    config
        .pitch_tiers
        .iter()
        .copied()
        .filter(|tier| *tier < current - TIER_EPSILON)
        .fold(None, |best: Option<f64>, tier| Some(best.map_or(tier, |b| b.max(tier))))
        .unwrap_or(lowest)
}

/// True when every point sits on the same coordinate.
pub fn is_single_location(points: &[GeoPoint]) -> bool {
    match points.split_first() {
        Some((first, rest)) => rest.iter().all(|p| p == first),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(zoom: f64, bearing: f64, pitch: f64) -> CameraState {
        CameraState {
            center: GeoPoint::new(12.97, 77.59).unwrap(),
            zoom,
            bearing,
            pitch,
        }
    }

    #[test]
    fn test_zoom_tilts_proportionally_and_clamps() {
        let config = CameraConfig::default();

        let target = zoom_target(&config, camera(10.0, 0.0, 0.0), 1.0);
        assert_eq!(target.zoom, Some(11.0));
        assert_eq!(target.pitch, Some(60.0 * 9.0 / 18.0));

        let target = zoom_target(&config, camera(19.5, 0.0, 0.0), 1.0);
        assert_eq!(target.zoom, Some(20.0));
        assert_eq!(target.pitch, Some(60.0));

        let target = zoom_target(&config, camera(2.3, 0.0, 10.0), -1.0);
        assert_eq!(target.zoom, Some(2.0));
        assert_eq!(target.pitch, Some(0.0));
    }

    #[test]
    fn test_rotation_wraps() {
        let config = CameraConfig::default();
        assert_eq!(
            rotate_target(&config, camera(11.0, 0.0, 0.0), -1.0).bearing,
            Some(315.0)
        );
        assert_eq!(
            rotate_target(&config, camera(11.0, 330.0, 0.0), 1.0).bearing,
            Some(15.0)
        );
    }

    #[test]
    fn test_pitch_steps_through_tiers() {
        let config = CameraConfig::default();

        assert_eq!(raise_pitch(&config, 0.0), 30.0);
        assert_eq!(raise_pitch(&config, 12.0), 30.0);
        assert_eq!(raise_pitch(&config, 30.0), 60.0);
        assert_eq!(raise_pitch(&config, 60.0), 60.0);

        assert_eq!(lower_pitch(&config, 60.0), 30.0);
        assert_eq!(lower_pitch(&config, 45.0), 30.0);
        assert_eq!(lower_pitch(&config, 30.0), 0.0);
        assert_eq!(lower_pitch(&config, 0.0), 0.0);
    }

    #[test]
    fn test_single_location_detection() {
        let a = GeoPoint::new(1.0, 1.0).unwrap();
        let b = GeoPoint::new(2.0, 1.0).unwrap();

        assert!(!is_single_location(&[]));
        assert!(is_single_location(&[a]));
        assert!(is_single_location(&[a, a]));
        assert!(!is_single_location(&[a, b]));
    }
}
