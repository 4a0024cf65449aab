use crate::config::SizingConfig;

/// Maps a camera zoom level to an icon scale.
///
/// The curve is an ease-in-out cubic between `min_zoom` and `max_zoom`,
/// clamped to `[min_size, max_size]` outside that range.
#[derive(Clone, Debug)]
pub struct IconSizing {
    config: SizingConfig,
}

impl IconSizing {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    pub fn min_size(&self) -> f64 {
        self.config.min_size
    }

    pub fn max_size(&self) -> f64 {
        self.config.max_size
    }

    pub fn size_for_zoom(&self, zoom: f64) -> f64 {
        let SizingConfig {
            min_zoom,
            max_zoom,
            min_size,
            max_size,
            ..
        } = self.config;

        if zoom.is_nan() || zoom <= min_zoom {
            return min_size;
        }
        if zoom >= max_zoom {
            return max_size;
        }

        let span = max_zoom - min_zoom;
        if span <= 0.0 {
            return max_size;
        }

        let t = (zoom - min_zoom) / span;
        (min_size + (max_size - min_size) * ease_in_out_cubic(t)).clamp(min_size, max_size)
    }

    /// Whether moving from `last` to `next` is large enough to be worth an update.
    pub fn should_update(&self, last: Option<f64>, next: f64) -> bool {
        match last {
            Some(last) => (next - last).abs() >= self.config.update_threshold,
            None => true,
        }
    }
}

impl Default for IconSizing {
    fn default() -> Self {
        Self::new(SizingConfig::default())
    }
}

fn ease_in_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}
