use super::RollingWindow;

/// Current volume relative to its rolling average
#[derive(Debug, Clone)]
pub struct VolumeProfile {
    window: RollingWindow,
    avg_volume: Option<f64>,
}

impl VolumeProfile {
    pub fn new(period: usize) -> Self {
        Self {
            window: RollingWindow::new(period),
            avg_volume: None,
        }
    }

    pub fn update(&mut self, volume: f64) -> Option<f64> {
        self.window.push(volume);
        self.avg_volume = self.window.mean();
        self.avg_volume
    }

    /// `volume / (avg + 1)`; the +1 keeps zero-volume stretches finite
    pub fn relative_volume(&self, current_volume: f64) -> Option<f64> {
        self.avg_volume.map(|avg| current_volume / (avg + 1.0))
    }
}

pub fn volume_ratio_series(volumes: &[f64], period: usize) -> Vec<f64> {
    let mut profile = VolumeProfile::new(period);
    volumes
        .iter()
        .map(|v| {
            profile.update(*v);
            profile.relative_volume(*v).unwrap_or(f64::NAN)
        })
        .collect()
}
