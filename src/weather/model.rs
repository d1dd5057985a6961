use chrono::{DateTime, Utc};
use serde::Serialize;

/// Display category for a weather condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConditionKind {
    Thunderstorm,
    Drizzle,
    Rain,
    Snow,
    Atmosphere,
    Clear,
    PartlyCloudy,
    Overcast,
    Windy,
}

impl ConditionKind {
    /// Maps a provider condition id to a category. Ids are grouped by their
    /// hundreds digit (2xx thunderstorm, 3xx drizzle, 5xx rain, 6xx snow,
    /// 7xx fog and friends); the 8xx group splits by cloud cover. Anything
    /// outside those groups falls back on wind strength.
    pub fn from_code(id: u32, wind_speed: f64) -> Self {
        match id / 100 {
            2 => ConditionKind::Thunderstorm,
            3 => ConditionKind::Drizzle,
            5 => ConditionKind::Rain,
            6 => ConditionKind::Snow,
            7 => ConditionKind::Atmosphere,
            8 => match id {
                800 => ConditionKind::Clear,
                801 | 802 => ConditionKind::PartlyCloudy,
                _ => ConditionKind::Overcast,
            },
            _ if wind_speed >= 15.0 => ConditionKind::Windy,
            _ => ConditionKind::Clear,
        }
    }
}

/// One condition entry as reported by the provider.
#[derive(Debug, Clone, Serialize)]
pub struct ConditionSummary {
    pub id: u32,
    pub name: String,
    pub description: Option<String>,
}

/// Current conditions, captured at fetch time. Replaced wholesale on refresh.
#[derive(Debug, Clone, Serialize)]
pub struct WeatherSnapshot {
    pub temp: f64,
    pub feels_like: Option<f64>,
    pub temp_min: Option<f64>,
    pub temp_max: Option<f64>,
    pub humidity: Option<f64>,
    pub conditions: Vec<ConditionSummary>,
    pub kind: ConditionKind,
    pub wind_speed: f64,
    pub wind_deg: Option<f64>,
    pub observed_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
}

/// One forecast timestep.
#[derive(Debug, Clone, Serialize)]
pub struct ForecastPoint {
    pub time: DateTime<Utc>,
    pub temp: f64,
    pub temp_min: Option<f64>,
    pub temp_max: Option<f64>,
    pub conditions: Vec<ConditionSummary>,
    pub cloudiness_pct: Option<f64>,
    pub wind_speed: Option<f64>,
    /// Probability of precipitation in [0, 1].
    pub precipitation_chance: Option<f64>,
}

/// Forecast timesteps in strictly ascending time order.
#[derive(Debug, Clone, Serialize)]
pub struct ForecastSeries {
    pub points: Vec<ForecastPoint>,
    pub fetched_at: DateTime<Utc>,
}

impl ForecastSeries {
    /// Parallel (time, temperature) vectors, ready for a chart widget.
    pub fn temperature_series(&self) -> (Vec<DateTime<Utc>>, Vec<f64>) {
        let times = self.points.iter().map(|p| p.time).collect();
        let temps = self.points.iter().map(|p| p.temp).collect();
        (times, temps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_kind_groups() {
        assert_eq!(ConditionKind::from_code(211, 0.0), ConditionKind::Thunderstorm);
        assert_eq!(ConditionKind::from_code(301, 0.0), ConditionKind::Drizzle);
        assert_eq!(ConditionKind::from_code(500, 0.0), ConditionKind::Rain);
        assert_eq!(ConditionKind::from_code(601, 0.0), ConditionKind::Snow);
        assert_eq!(ConditionKind::from_code(741, 0.0), ConditionKind::Atmosphere);
    }

    #[test]
    fn test_condition_kind_cloud_split() {
        assert_eq!(ConditionKind::from_code(800, 0.0), ConditionKind::Clear);
        assert_eq!(ConditionKind::from_code(801, 0.0), ConditionKind::PartlyCloudy);
        assert_eq!(ConditionKind::from_code(802, 0.0), ConditionKind::PartlyCloudy);
        assert_eq!(ConditionKind::from_code(803, 0.0), ConditionKind::Overcast);
        assert_eq!(ConditionKind::from_code(804, 0.0), ConditionKind::Overcast);
    }

    #[test]
    fn test_condition_kind_wind_fallback() {
        // Ids outside the known groups defer to wind strength.
        assert_eq!(ConditionKind::from_code(900, 20.0), ConditionKind::Windy);
        assert_eq!(ConditionKind::from_code(900, 5.0), ConditionKind::Clear);
    }

    #[test]
    fn test_temperature_series_is_parallel() {
        let base = DateTime::from_timestamp(1700000000, 0).unwrap();
        let series = ForecastSeries {
            points: (0..3i64)
                .map(|i| ForecastPoint {
                    time: base + chrono::Duration::hours(3 * i),
                    temp: 20.0 + i as f64,
                    temp_min: None,
                    temp_max: None,
                    conditions: vec![],
                    cloudiness_pct: None,
                    wind_speed: None,
                    precipitation_chance: None,
                })
                .collect(),
            fetched_at: base,
        };

        let (times, temps) = series.temperature_series();
        assert_eq!(times.len(), 3);
        assert_eq!(temps, vec![20.0, 21.0, 22.0]);
        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }
}
