use chrono::{DateTime, Days, Duration, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::{
    error::{PipelineError, Result},
    model::{DayNightAverages, EnrichedObservation, Report},
    pressure::hpa_to_mmhg,
    store::ObservationStore,
};

/// Where calendar days start when slicing the window and grouping by day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayBoundary {
    offset: FixedOffset,
}

impl Default for DayBoundary {
    fn default() -> Self {
        Self::utc()
    }
}

impl DayBoundary {
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    /// Days start at local midnight of a fixed UTC offset, e.g. `180` for UTC+3.
    pub fn offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(|offset| Self { offset })
    }

    pub fn day_of(&self, ts: DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(&self.offset).date_naive()
    }

    pub fn start_of(&self, date: NaiveDate) -> DateTime<Utc> {
        let local_midnight = date.and_time(chrono::NaiveTime::MIN);
        let shift = Duration::seconds(i64::from(self.offset.local_minus_utc()));
        Utc.from_utc_datetime(&(local_midnight - shift))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureUnit {
    #[default]
    Hpa,
    Mmhg,
}

/// A daily-mean pressure strictly below `value` (in `unit`) counts as a low day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureThreshold {
    pub value: f64,
    pub unit: PressureUnit,
}

impl Default for PressureThreshold {
    fn default() -> Self {
        Self { value: 1000.0, unit: PressureUnit::Hpa }
    }
}

impl PressureThreshold {
    fn is_below(&self, mean_hpa: f64) -> bool {
        let mean = match self.unit {
            PressureUnit::Hpa => mean_hpa,
            PressureUnit::Mmhg => hpa_to_mmhg(mean_hpa),
        };
        mean < self.value
    }
}

/// Computes the trailing-window analytics from the store as of a run date.
///
/// The window holds the `window_days` whole days before the run date; the run
/// date itself is excluded. Partial days inside the range count wholesale.
#[derive(Debug, Clone, Copy)]
pub struct WindowAggregator {
    window_days: u32,
    boundary: DayBoundary,
    threshold: PressureThreshold,
}

impl Default for WindowAggregator {
    fn default() -> Self {
        Self::new(7, DayBoundary::utc(), PressureThreshold::default())
    }
}

impl WindowAggregator {
    pub fn new(window_days: u32, boundary: DayBoundary, threshold: PressureThreshold) -> Self {
        Self { window_days: window_days.max(1), boundary, threshold }
    }

    /// Half-open UTC interval `[start, end)` covered for `run_date`.
    pub fn window(&self, run_date: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let first_day = run_date
            .checked_sub_days(Days::new(u64::from(self.window_days)))
            .ok_or_else(|| {
                PipelineError::InvalidRunDate(format!("{run_date} is too early for the window"))
            })?;

        Ok((self.boundary.start_of(first_day), self.boundary.start_of(run_date)))
    }

    pub fn aggregate<S>(&self, store: &S, run_date: NaiveDate) -> Result<Report>
    where
        S: ObservationStore + ?Sized,
    {
        let (start, end) = self.window(run_date)?;
        let rows = store.query_range(start, end).map_err(PipelineError::Aggregation)?;

        debug!(%start, %end, rows = rows.len(), "Loaded analytics window");
        Ok(self.summarize(run_date, &rows))
    }

    /// Metrics over an already-sliced window. `rows` must be sorted by timestamp.
    pub fn summarize(&self, run_date: NaiveDate, rows: &[EnrichedObservation]) -> Report {
        if rows.is_empty() {
            return Report {
                run_date,
                avg_temp_last7d: None,
                avg_temp_by_daynight: None,
                days_below_1000_mmhg: None,
                hours_temp_apparent_greater_actual: None,
            };
        }

        let mut all = Mean::default();
        let mut day = Mean::default();
        let mut night = Mean::default();
        let mut daily_pressure: BTreeMap<NaiveDate, Mean> = BTreeMap::new();
        let mut apparent_warmer = 0u32;

        for row in rows {
            all.push(row.temperature_c);
            if row.is_day {
                day.push(row.temperature_c);
            } else {
                night.push(row.temperature_c);
            }

            daily_pressure
                .entry(self.boundary.day_of(row.timestamp))
                .or_default()
                .push(row.pressure_at_location);

            if row.apparent_temperature_c > row.temperature_c {
                apparent_warmer += 1;
            }
        }

        let low_days = daily_pressure
            .values()
            .filter_map(Mean::value)
            .filter(|&mean| self.threshold.is_below(mean))
            .count() as u32;

        Report {
            run_date,
            avg_temp_last7d: all.value(),
            avg_temp_by_daynight: Some(DayNightAverages { day: day.value(), night: night.value() }),
            days_below_1000_mmhg: Some(low_days),
            hours_temp_apparent_greater_actual: Some(apparent_warmer),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Mean {
    sum: f64,
    count: u32,
}

impl Mean {
    fn push(&mut self, v: f64) {
        self.sum += v;
        self.count += 1;
    }

    fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / f64::from(self.count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{merge::MergeMode, store::SqliteStore};

    fn run_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 15).unwrap()
    }

    fn at(date: NaiveDate, hour: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(&date.and_hms_opt(hour, 0, 0).unwrap())
    }

    fn row(ts: DateTime<Utc>, temp: f64, apparent: f64, is_day: bool, hpa: f64) -> EnrichedObservation {
        EnrichedObservation {
            timestamp: ts,
            temperature_c: temp,
            apparent_temperature_c: apparent,
            relative_humidity: 0.5,
            precipitation_probability: 0.0,
            is_day,
            pressure_at_location: hpa,
        }
    }

    /// 24 rows per day for each of the seven days before `run_date()`.
    fn week(f: impl Fn(NaiveDate, u32) -> EnrichedObservation) -> Vec<EnrichedObservation> {
        (1..=7u64)
            .rev()
            .flat_map(|back| {
                let date = run_date() - Days::new(back);
                (0..24).map(move |h| (date, h))
            })
            .map(|(date, h)| f(date, h))
            .collect()
    }

    fn store_with(rows: &[EnrichedObservation]) -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.upsert(rows, MergeMode::AppendNew).unwrap();
        store
    }

    #[test]
    fn window_covers_seven_days_before_run_date() {
        let (start, end) = WindowAggregator::default().window(run_date()).unwrap();

        assert_eq!(start, at(NaiveDate::from_ymd_opt(2024, 5, 8).unwrap(), 0));
        assert_eq!(end, at(run_date(), 0));
    }

    #[test]
    fn all_day_week_scenario() {
        let store = store_with(&week(|d, h| row(at(d, h), 10.0, 12.0, true, 1013.0)));
        let report = WindowAggregator::default().aggregate(&store, run_date()).unwrap();

        assert_eq!(report.avg_temp_last7d, Some(10.0));
        assert_eq!(report.hours_temp_apparent_greater_actual, Some(168));
        let split = report.avg_temp_by_daynight.unwrap();
        assert_eq!(split.day, Some(10.0));
        assert_eq!(split.night, None);
    }

    #[test]
    fn one_low_pressure_day_is_counted() {
        let low_day = run_date() - Days::new(3);
        let store = store_with(&week(|d, h| {
            let hpa = if d == low_day { 900.0 } else { 1020.0 };
            row(at(d, h), 5.0, 5.0, h >= 6 && h < 18, hpa)
        }));
        let report = WindowAggregator::default().aggregate(&store, run_date()).unwrap();

        assert_eq!(report.days_below_1000_mmhg, Some(1));
        assert_eq!(report.hours_temp_apparent_greater_actual, Some(0));
    }

    #[test]
    fn daily_mean_decides_not_single_hours() {
        // Half the hours at 990, half at 1012: the mean of 1001 is not low.
        let store = store_with(&week(|d, h| {
            row(at(d, h), 5.0, 5.0, true, if h % 2 == 0 { 990.0 } else { 1012.0 })
        }));
        let report = WindowAggregator::default().aggregate(&store, run_date()).unwrap();

        assert_eq!(report.days_below_1000_mmhg, Some(0));
    }

    #[test]
    fn threshold_equal_to_mean_is_not_below() {
        let store = store_with(&week(|d, h| row(at(d, h), 5.0, 5.0, true, 1000.0)));
        let report = WindowAggregator::default().aggregate(&store, run_date()).unwrap();

        assert_eq!(report.days_below_1000_mmhg, Some(0));
    }

    #[test]
    fn mmhg_threshold_converts_daily_mean() {
        let store = store_with(&week(|d, h| {
            let hpa = if d == run_date() - Days::new(1) { 1340.0 } else { 1020.0 };
            row(at(d, h), 5.0, 5.0, true, hpa)
        }));
        let threshold = PressureThreshold { value: 1000.0, unit: PressureUnit::Mmhg };
        let aggregator = WindowAggregator::new(7, DayBoundary::utc(), threshold);

        // 1340 hPa ≈ 1005 mmHg; 1020 hPa ≈ 765 mmHg.
        assert_eq!(aggregator.aggregate(&store, run_date()).unwrap().days_below_1000_mmhg, Some(6));
    }

    #[test]
    fn equal_temperatures_do_not_count_as_warmer() {
        let store = store_with(&week(|d, h| {
            let apparent = if h == 0 { 6.0 } else { 5.0 };
            row(at(d, h), 5.0, apparent, false, 1010.0)
        }));
        let report = WindowAggregator::default().aggregate(&store, run_date()).unwrap();

        assert_eq!(report.hours_temp_apparent_greater_actual, Some(7));
        assert_eq!(report.avg_temp_by_daynight.unwrap().day, None);
    }

    #[test]
    fn rows_outside_window_are_ignored() {
        let mut rows = week(|d, h| row(at(d, h), 10.0, 9.0, true, 1010.0));
        rows.push(row(at(run_date(), 0), 100.0, 200.0, false, 500.0));
        rows.push(row(at(run_date() - Days::new(8), 23), -100.0, 200.0, false, 500.0));
        let store = store_with(&rows);

        let report = WindowAggregator::default().aggregate(&store, run_date()).unwrap();
        assert_eq!(report.avg_temp_last7d, Some(10.0));
        assert_eq!(report.hours_temp_apparent_greater_actual, Some(0));
        assert_eq!(report.days_below_1000_mmhg, Some(0));
    }

    #[test]
    fn partial_days_are_included() {
        let yesterday = run_date() - Days::new(1);
        let rows = vec![
            row(at(yesterday, 10), 4.0, 5.0, true, 1005.0),
            row(at(yesterday, 22), 2.0, 1.0, false, 1005.0),
        ];
        let report = WindowAggregator::default().aggregate(&store_with(&rows), run_date()).unwrap();

        assert_eq!(report.avg_temp_last7d, Some(3.0));
        let split = report.avg_temp_by_daynight.unwrap();
        assert_eq!((split.day, split.night), (Some(4.0), Some(2.0)));
        assert_eq!(report.hours_temp_apparent_greater_actual, Some(1));
    }

    #[test]
    fn empty_store_yields_nulls() {
        let store = SqliteStore::open_in_memory().unwrap();
        let report = WindowAggregator::default().aggregate(&store, run_date()).unwrap();

        assert_eq!(report.run_date, run_date());
        assert_eq!(report.avg_temp_last7d, None);
        assert_eq!(report.avg_temp_by_daynight, None);
        assert_eq!(report.days_below_1000_mmhg, None);
        assert_eq!(report.hours_temp_apparent_greater_actual, None);
    }

    #[test]
    fn repeated_runs_are_bit_identical() {
        let store = store_with(&week(|d, h| {
            row(at(d, h), 0.1 * f64::from(h) + 0.3, 0.7, h % 3 == 0, 998.7 + f64::from(h))
        }));
        let aggregator = WindowAggregator::default();

        let a = aggregator.aggregate(&store, run_date()).unwrap();
        let b = aggregator.aggregate(&store, run_date()).unwrap();
        assert_eq!(a.avg_temp_last7d.map(f64::to_bits), b.avg_temp_last7d.map(f64::to_bits));
        assert_eq!(a, b);
    }

    #[test]
    fn offset_boundary_shifts_window() {
        let utc3 = DayBoundary::offset_minutes(180).unwrap();
        let aggregator = WindowAggregator::new(7, utc3, PressureThreshold::default());
        let (start, end) = aggregator.window(run_date()).unwrap();

        assert_eq!(end, at(run_date() - Days::new(1), 21));
        assert_eq!(start, at(NaiveDate::from_ymd_opt(2024, 5, 7).unwrap(), 21));

        // 22:00 UTC on the 14th is already the 15th in UTC+3.
        assert_eq!(utc3.day_of(at(run_date() - Days::new(1), 22)), run_date());
    }
}
