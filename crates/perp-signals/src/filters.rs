//! Admission filters.
//!
//! Each filter can be toggled independently; a disabled filter always
//! passes. A rejection is a normal outcome carrying a structured reason,
//! never an error.

use perp_config::FilterSettings;
use perp_core::types::{FilterReject, IndicatorSnapshot, PositionSide};

/// Filter pipeline applied to every candidate signal before it is returned.
#[derive(Debug, Clone)]
pub struct AdmissionFilters {
    settings: FilterSettings,
}

impl AdmissionFilters {
    pub fn new(settings: FilterSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &FilterSettings {
        &self.settings
    }

    /// Run all enabled filters. The first failure wins.
    pub fn check(
        &self,
        direction: PositionSide,
        strength_pct: f64,
        snapshot: &IndicatorSnapshot,
    ) -> Result<(), FilterReject> {
        self.check_rsi(direction, snapshot)?;
        self.check_macd(direction, snapshot)?;
        self.check_kdj(direction, strength_pct, snapshot)?;
        self.check_ma_distance(direction, snapshot)?;
        Ok(())
    }

    fn check_rsi(
        &self,
        direction: PositionSide,
        snapshot: &IndicatorSnapshot,
    ) -> Result<(), FilterReject> {
        if !self.settings.rsi_enabled {
            return Ok(());
        }
        let Some(rsi) = snapshot.rsi else {
            return Ok(());
        };
        match direction {
            PositionSide::Long if rsi > self.settings.rsi_long_max => {
                Err(FilterReject::RsiOverbought {
                    rsi,
                    bound: self.settings.rsi_long_max,
                })
            }
            PositionSide::Short if rsi < self.settings.rsi_short_min => {
                Err(FilterReject::RsiOversold {
                    rsi,
                    bound: self.settings.rsi_short_min,
                })
            }
            _ => Ok(()),
        }
    }

    fn check_macd(
        &self,
        direction: PositionSide,
        snapshot: &IndicatorSnapshot,
    ) -> Result<(), FilterReject> {
        if !self.settings.macd_enabled {
            return Ok(());
        }
        let Some(histogram) = snapshot.macd_histogram else {
            return Ok(());
        };
        let agrees = match direction {
            PositionSide::Long => histogram >= 0.0,
            PositionSide::Short => histogram <= 0.0,
        };
        if agrees {
            Ok(())
        } else {
            Err(FilterReject::MacdDisagrees { histogram })
        }
    }

    fn check_kdj(
        &self,
        direction: PositionSide,
        strength_pct: f64,
        snapshot: &IndicatorSnapshot,
    ) -> Result<(), FilterReject> {
        if !self.settings.kdj_enabled {
            return Ok(());
        }
        // Very strong signals override the overextension check
        if strength_pct >= self.settings.kdj_override_strength_pct {
            return Ok(());
        }
        let Some(j) = snapshot.kdj_j else {
            return Ok(());
        };
        match direction {
            PositionSide::Long if j > self.settings.kdj_overbought => {
                Err(FilterReject::KdjOverextended {
                    j,
                    bound: self.settings.kdj_overbought,
                })
            }
            PositionSide::Short if j < self.settings.kdj_oversold => {
                Err(FilterReject::KdjOverextended {
                    j,
                    bound: self.settings.kdj_oversold,
                })
            }
            _ => Ok(()),
        }
    }

    /// Anti-chase: reject entering after price has already run too far from
    /// its own short EMA in the entry direction.
    fn check_ma_distance(
        &self,
        direction: PositionSide,
        snapshot: &IndicatorSnapshot,
    ) -> Result<(), FilterReject> {
        let cap = self.settings.ma_distance_cap_pct;
        let chased = match direction {
            PositionSide::Long => snapshot.ma_distance_pct > cap,
            PositionSide::Short => snapshot.ma_distance_pct < -cap,
        };
        if chased {
            Err(FilterReject::TooFarFromMean {
                distance_pct: snapshot.ma_distance_pct,
                cap_pct: cap,
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> IndicatorSnapshot {
        IndicatorSnapshot {
            ema_spread_pct: 0.3,
            rsi: Some(55.0),
            macd_histogram: Some(0.5),
            kdj_j: Some(50.0),
            ma_distance_pct: 0.4,
        }
    }

    fn filters(settings: FilterSettings) -> AdmissionFilters {
        AdmissionFilters::new(settings)
    }

    #[test]
    fn test_neutral_snapshot_passes() {
        let f = filters(FilterSettings::default());
        assert!(f.check(PositionSide::Long, 0.3, &snapshot()).is_ok());
        assert!(f.check(PositionSide::Short, 0.3, &snapshot()).is_ok());
    }

    #[test]
    fn test_rsi_bounds() {
        let f = filters(FilterSettings::default());

        let mut hot = snapshot();
        hot.rsi = Some(75.0);
        assert!(matches!(
            f.check(PositionSide::Long, 0.3, &hot),
            Err(FilterReject::RsiOverbought { .. })
        ));
        // The same RSI is fine for a short
        assert!(f.check(PositionSide::Short, 0.3, &hot).is_ok());

        let mut cold = snapshot();
        cold.rsi = Some(25.0);
        assert!(matches!(
            f.check(PositionSide::Short, 0.3, &cold),
            Err(FilterReject::RsiOversold { .. })
        ));
    }

    #[test]
    fn test_disabled_rsi_passes_everything() {
        let mut settings = FilterSettings::default();
        settings.rsi_enabled = false;
        let f = filters(settings);

        let mut hot = snapshot();
        hot.rsi = Some(95.0);
        assert!(f.check(PositionSide::Long, 0.3, &hot).is_ok());
    }

    #[test]
    fn test_macd_sign_check() {
        let mut settings = FilterSettings::default();
        settings.macd_enabled = true;
        let f = filters(settings);

        let mut snap = snapshot();
        snap.macd_histogram = Some(-0.2);
        assert!(matches!(
            f.check(PositionSide::Long, 0.3, &snap),
            Err(FilterReject::MacdDisagrees { .. })
        ));
        assert!(f.check(PositionSide::Short, 0.3, &snap).is_ok());
    }

    #[test]
    fn test_kdj_override_on_strong_signal() {
        let mut settings = FilterSettings::default();
        settings.kdj_enabled = true;
        let f = filters(settings);

        let mut snap = snapshot();
        snap.kdj_j = Some(92.0);
        assert!(matches!(
            f.check(PositionSide::Long, 0.3, &snap),
            Err(FilterReject::KdjOverextended { .. })
        ));
        // Strength at or past the override threshold skips the check
        assert!(f.check(PositionSide::Long, 1.2, &snap).is_ok());
    }

    #[test]
    fn test_ma_distance_is_directional() {
        let f = filters(FilterSettings::default());

        let mut snap = snapshot();
        snap.ma_distance_pct = 3.1;
        assert!(matches!(
            f.check(PositionSide::Long, 0.3, &snap),
            Err(FilterReject::TooFarFromMean { .. })
        ));
        // A short enters against the stretch, not into it
        assert!(f.check(PositionSide::Short, 0.3, &snap).is_ok());
    }

    #[test]
    fn test_missing_indicator_passes() {
        let f = filters(FilterSettings::default());
        let mut snap = snapshot();
        snap.rsi = None;
        assert!(f.check(PositionSide::Long, 0.3, &snap).is_ok());
    }
}
