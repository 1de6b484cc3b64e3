/// Index of the dataset to play for the current head height: 0 for the
/// main dataset, `i + 1` for `ratios[i]`. A ratio below 1 activates when
/// the head is lower than that share of the eye height, above 1 when it is
/// higher. Later ratios win.
pub fn select_variant(ratios: &[f32], head_height: f32, eyes_height: f32) -> usize {
    if !(eyes_height > 0.0) {
        return 0;
    }
    let height = head_height / eyes_height;
    ratios
        .iter()
        .enumerate()
        .filter(|&(_, &ratio)| (ratio < 1.0 && height < ratio) || (ratio > 1.0 && height > ratio))
        .map(|(index, _)| index + 1)
        .last()
        .unwrap_or(0)
}

/// Remembers the user's standing eye height.
#[derive(Clone, Debug, PartialEq)]
pub struct Calibrator {
    eyes_height: f32,
    cooldown: f32,
    last_calibration: Option<f32>,
}

impl Calibrator {
    pub fn new(eyes_height: f32, cooldown: f32) -> Self {
        Self {
            eyes_height,
            cooldown,
            last_calibration: None,
        }
    }

    pub fn eyes_height(&self) -> f32 {
        self.eyes_height
    }

    /// Takes `head_height` as the new eye height unless the previous
    /// calibration is less than the cooldown old. `now` is in seconds.
    pub fn calibrate(&mut self, head_height: f32, now: f32) -> bool {
        if !(head_height > 0.0) {
            return false;
        }
        if self
            .last_calibration
            .is_some_and(|last| now < last + self.cooldown)
        {
            return false;
        }
        self.eyes_height = head_height;
        self.last_calibration = Some(now);
        true
    }

    /// Uniform scale that gives an avatar with eyes at `avatar_eyes_height`
    /// the calibrated eye height.
    pub fn avatar_scale(&self, avatar_eyes_height: f32) -> f32 {
        if avatar_eyes_height > 0.0 {
            self.eyes_height / avatar_eyes_height
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_variants_by_height_ratio() {
        let ratios = [0.8, 0.5];
        assert_eq!(select_variant(&ratios, 1.7, 1.8), 0);
        assert_eq!(select_variant(&ratios, 1.3, 1.8), 1);
        assert_eq!(select_variant(&ratios, 0.8, 1.8), 2);
        assert_eq!(select_variant(&[], 0.5, 1.8), 0);
    }

    #[test]
    fn ratios_above_one_trigger_when_higher() {
        assert_eq!(select_variant(&[1.1], 2.1, 1.8), 1);
        assert_eq!(select_variant(&[1.1], 1.8, 1.8), 0);
    }

    #[test]
    fn calibration_respects_the_cooldown() {
        let mut calibrator = Calibrator::new(1.8, 2.0);
        assert!(calibrator.calibrate(1.6, 0.0));
        assert!(!calibrator.calibrate(1.5, 1.0));
        assert_eq!(calibrator.eyes_height(), 1.6);
        assert!(calibrator.calibrate(1.5, 2.5));
        assert_eq!(calibrator.eyes_height(), 1.5);
        assert!((calibrator.avatar_scale(1.5) - 1.0).abs() < 1e-6);
    }
}
