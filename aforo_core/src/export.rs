//! Export shapes handed to the reporting side.
//!
//! `ExportTable` maps one-to-one onto the `Periodo,<classes...>` CSV with a
//! trailing `TOTAL` row. `AggregateSnapshot` is the serializable view of the
//! bucket map. Both drop hidden tracks unless asked to keep them.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use crate::aggregate::{AggregationState, BucketKey};
use crate::error::AforoError;
use crate::movement::MovementCode;
use crate::types::{Cardinal, ObjectClass};

/// Header of the row label column.
pub const PERIOD_HEADER: &str = "Periodo";

/// Label of the trailing sum row.
pub const TOTAL_LABEL: &str = "TOTAL";

/// Which counts go into an export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Restrict to one branch; all branches are merged otherwise
    pub branch: Option<Cardinal>,
    /// Restrict to one movement
    pub movement: Option<MovementCode>,
    /// Keep hidden tracks (live tables do, reports do not)
    pub include_hidden: bool,
}

/// One time slot of the export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRow {
    pub period: String,
    pub values: Vec<u64>,
}

/// Rows per 15-minute slot, one column per class, plus column totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportTable {
    pub columns: Vec<String>,
    pub rows: Vec<ExportRow>,
    pub total: Vec<u64>,
}

/// Formats a slot as `YYYY-MM-DD HH:MM-HH:MM`.
pub fn period_label(key: &BucketKey) -> String {
    format_slot(key.start, key.end())
}

fn format_slot(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> String {
    format!("{}-{}", start.format("%Y-%m-%d %H:%M"), end.format("%H:%M"))
}

impl ExportTable {
    /// Builds the table from live counts.
    pub fn from_state(state: &AggregationState, options: &ExportOptions) -> Self {
        let columns: Vec<String> = ObjectClass::ALL.iter().map(|c| c.name().to_string()).collect();
        let column_of = |class: ObjectClass| ObjectClass::ALL.iter().position(|c| *c == class);

        // Keyed by slot start so branches sharing a slot merge into one row
        let mut slots: BTreeMap<DateTime<FixedOffset>, (String, Vec<u64>)> = BTreeMap::new();

        for (key, bucket) in state.buckets() {
            if options.branch.map(|b| b != key.branch).unwrap_or(false) {
                continue;
            }
            let (_, values) = slots
                .entry(key.start)
                .or_insert_with(|| (period_label(key), vec![0; columns.len()]));

            for (count_key, count) in bucket.counts() {
                if options.movement.map(|m| m != count_key.movement).unwrap_or(false) {
                    continue;
                }
                let value = if options.include_hidden {
                    *count
                } else {
                    bucket.exported_count(count_key)
                };
                if let Some(column) = column_of(count_key.class) {
                    values[column] += value;
                }
            }
        }

        let rows: Vec<ExportRow> = slots
            .into_values()
            .map(|(period, values)| ExportRow { period, values })
            .collect();
        let total = column_totals(&rows, columns.len());

        Self { columns, rows, total }
    }

    /// Sum of every cell.
    pub fn grand_total(&self) -> u64 {
        self.total.iter().sum()
    }

    /// Writes `Periodo,<columns...>`, the rows and the `TOTAL` row.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), AforoError> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        let mut header = vec![PERIOD_HEADER.to_string()];
        header.extend(self.columns.iter().cloned());
        csv_writer.write_record(&header)?;

        for row in &self.rows {
            csv_writer.write_record(record(&row.period, &row.values))?;
        }
        csv_writer.write_record(record(TOTAL_LABEL, &self.total))?;
        csv_writer.flush()?;
        Ok(())
    }

    /// Writes the CSV to a file.
    pub fn write_csv_file<P: AsRef<Path>>(&self, path: P) -> Result<(), AforoError> {
        let file = std::fs::File::create(path)?;
        self.write_csv(file)
    }

    /// Renders the CSV into a string.
    pub fn to_csv_string(&self) -> Result<String, AforoError> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;
        String::from_utf8(buffer).map_err(|e| AforoError::malformed(e.to_string()))
    }

    /// Parses a CSV written by [`ExportTable::write_csv`].
    ///
    /// The `TOTAL` row must be last and must match the column sums.
    pub fn read_csv<R: io::Read>(reader: R) -> Result<Self, AforoError> {
        let mut csv_reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let mut header_iter = headers.iter();
        if header_iter.next() != Some(PERIOD_HEADER) {
            return Err(AforoError::malformed(format!("first column must be {}", PERIOD_HEADER)));
        }
        let columns: Vec<String> = header_iter.map(str::to_string).collect();

        let mut rows = Vec::new();
        let mut total = None;

        for result in csv_reader.records() {
            let record = result?;
            if total.is_some() {
                return Err(AforoError::malformed("rows after TOTAL"));
            }

            let label = record.get(0).unwrap_or_default().to_string();
            let values = record
                .iter()
                .skip(1)
                .map(|cell| {
                    cell.trim()
                        .parse::<u64>()
                        .map_err(|_| AforoError::malformed(format!("bad count '{}' in row {}", cell, label)))
                })
                .collect::<Result<Vec<u64>, AforoError>>()?;
            if values.len() != columns.len() {
                return Err(AforoError::malformed(format!("row {} has {} values", label, values.len())));
            }

            if label == TOTAL_LABEL {
                total = Some(values);
            } else {
                rows.push(ExportRow { period: label, values });
            }
        }

        let total = total.ok_or_else(|| AforoError::malformed("missing TOTAL row"))?;
        if total != column_totals(&rows, columns.len()) {
            return Err(AforoError::malformed("TOTAL row does not match column sums"));
        }

        Ok(Self { columns, rows, total })
    }
}

fn record(label: &str, values: &[u64]) -> Vec<String> {
    std::iter::once(label.to_string())
        .chain(values.iter().map(u64::to_string))
        .collect()
}

fn column_totals(rows: &[ExportRow], width: usize) -> Vec<u64> {
    let mut totals = vec![0; width];
    for row in rows {
        for (total, value) in totals.iter_mut().zip(&row.values) {
            *total += value;
        }
    }
    totals
}

/// One (movement, class) counter in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountSnapshot {
    pub movement: MovementCode,
    pub class: ObjectClass,
    pub count: u64,
}

/// One bucket in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSnapshot {
    pub key: BucketKey,
    pub label: String,
    pub total: u64,
    pub hidden: u64,
    pub counts: Vec<CountSnapshot>,
}

/// Serializable view of an aggregation state.
///
/// Live tables keep hidden tracks; reporting artifacts drop them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    /// Whether hidden tracks are part of the counts
    pub include_hidden: bool,
    pub tracks_counted: usize,
    pub grand_total: u64,
    pub last_touched: Option<BucketKey>,
    pub buckets: Vec<BucketSnapshot>,
}

impl AggregateSnapshot {
    /// Builds a snapshot, optionally leaving hidden tracks out.
    ///
    /// Without hidden tracks, buckets that only held hidden counts are
    /// dropped and `hidden` is zero everywhere.
    pub fn from_state(state: &AggregationState, include_hidden: bool) -> Self {
        let buckets: Vec<BucketSnapshot> = state
            .buckets()
            .filter_map(|(key, bucket)| {
                let counts: Vec<CountSnapshot> = bucket
                    .counts()
                    .map(|(k, count)| CountSnapshot {
                        movement: k.movement,
                        class: k.class,
                        count: if include_hidden { *count } else { bucket.exported_count(k) },
                    })
                    .filter(|c| c.count > 0)
                    .collect();
                let (total, hidden) = if include_hidden {
                    (bucket.total(), bucket.hidden_total())
                } else {
                    (bucket.total() - bucket.hidden_total(), 0)
                };

                (total > 0).then(|| BucketSnapshot {
                    key: *key,
                    label: period_label(key),
                    total,
                    hidden,
                    counts,
                })
            })
            .collect();

        let grand_total: u64 = buckets.iter().map(|b| b.total).sum();
        let last_touched = state
            .last_touched()
            .filter(|key| buckets.iter().any(|b| b.key == *key));

        Self {
            include_hidden,
            // One count per counted track
            tracks_counted: grand_total as usize,
            grand_total,
            last_touched,
            buckets,
        }
    }
}

impl From<&AggregationState> for AggregateSnapshot {
    fn from(state: &AggregationState) -> Self {
        Self::from_state(state, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NormalizeOptions;
    use crate::normalize::{fixtures, normalize};
    use crate::types::{Correction, TrackId};
    use crate::zones::ZoneSet;

    fn counted_state() -> AggregationState {
        let specs = [
            (1, "N", "S", "car", "2025-08-13T07:07:00Z", false),
            (2, "S", "N", "car", "2025-08-13T07:10:00Z", false),
            (3, "N", "E", "truck", "2025-08-13T07:16:00Z", false),
            (4, "E", "O", "person", "2025-08-13T07:29:59Z", false),
            (5, "N", "S", "car", "2025-08-13T07:01:00Z", true),
        ];

        let mut state = AggregationState::new();
        for (track, origin, destination, class, exit, hidden) in specs {
            let mut raw = fixtures::raw(track);
            raw.origin = Some(origin.to_string());
            raw.destination = Some(destination.to_string());
            raw.class = class.to_string();
            raw.timestamp_exit = exit.to_string();
            let correction = hidden.then(|| Correction::for_track(TrackId(track)).hidden());
            state.record(&normalize(&raw, correction.as_ref(), &ZoneSet::empty(), &NormalizeOptions::default()));
        }
        state
    }

    #[test]
    fn test_table_merges_branches_and_drops_hidden() {
        let table = ExportTable::from_state(&counted_state(), &ExportOptions::default());

        assert_eq!(table.columns[0], "car");
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].period, "2025-08-13 07:00-07:15");
        assert_eq!(table.rows[0].values[0], 2);
        assert_eq!(table.rows[1].period, "2025-08-13 07:15-07:30");
        assert_eq!(table.rows[1].values, vec![0, 1, 0, 0, 0, 1]);
        assert_eq!(table.grand_total(), 4);
    }

    #[test]
    fn test_table_filters() {
        let state = counted_state();

        let live = ExportTable::from_state(&state, &ExportOptions { include_hidden: true, ..Default::default() });
        assert_eq!(live.grand_total(), state.grand_total());

        let north = ExportTable::from_state(&state, &ExportOptions { branch: Some(Cardinal::North), ..Default::default() });
        assert_eq!(north.grand_total(), 2);

        let direct = ExportTable::from_state(
            &state,
            &ExportOptions { movement: MovementCode::parse("1"), include_hidden: true, ..Default::default() },
        );
        assert_eq!(direct.total[0], 2);
    }

    #[test]
    fn test_csv_layout() {
        let table = ExportTable::from_state(&counted_state(), &ExportOptions::default());
        let csv = table.to_csv_string().unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "Periodo,car,truck,bus,motorcycle,bicycle,person");
        assert_eq!(lines[1], "2025-08-13 07:00-07:15,2,0,0,0,0,0");
        assert_eq!(lines.last().copied(), Some("TOTAL,2,1,0,0,0,1"));
    }

    #[test]
    fn test_csv_reads_back_exactly() {
        let table = ExportTable::from_state(&counted_state(), &ExportOptions::default());
        let csv = table.to_csv_string().unwrap();

        let parsed = ExportTable::read_csv(csv.as_bytes()).unwrap();
        assert_eq!(parsed, table);
    }

    #[test]
    fn test_csv_rejects_bad_total() {
        let csv = "Periodo,car\n07:00,2\nTOTAL,3\n";
        assert!(matches!(ExportTable::read_csv(csv.as_bytes()), Err(AforoError::MalformedExport(_))));

        let csv = "Periodo,car\n07:00,2\n";
        assert!(matches!(ExportTable::read_csv(csv.as_bytes()), Err(AforoError::MalformedExport(_))));
    }

    #[test]
    fn test_snapshot_serializes() {
        let state = counted_state();
        let snapshot = AggregateSnapshot::from(&state);

        assert_eq!(snapshot.grand_total, 5);
        assert_eq!(snapshot.tracks_counted, 5);
        assert_eq!(snapshot.buckets.iter().map(|b| b.hidden).sum::<u64>(), 1);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["buckets"][0]["key"]["branch"], "N");
        assert_eq!(json["buckets"][0]["counts"][0]["movement"], "1");
    }

    #[test]
    fn test_snapshot_without_hidden() {
        let state = counted_state();
        let snapshot = AggregateSnapshot::from_state(&state, false);

        assert!(!snapshot.include_hidden);
        assert_eq!(snapshot.grand_total, 4);
        assert_eq!(snapshot.tracks_counted, 4);
        assert!(snapshot.buckets.iter().all(|b| b.hidden == 0));

        // Track 5 was the only hidden car; its N→S count drops to track 1's
        let direct = MovementCode::parse("1").unwrap();
        let car_direct: u64 = snapshot
            .buckets
            .iter()
            .flat_map(|b| b.counts.iter())
            .filter(|c| c.movement == direct && c.class == ObjectClass::Car)
            .map(|c| c.count)
            .sum();
        assert_eq!(car_direct, 1);

        let table = ExportTable::from_state(&state, &ExportOptions::default());
        assert_eq!(snapshot.grand_total, table.grand_total());
    }
}
