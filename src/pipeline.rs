use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::annotate::{Classification, RecordAnnotator, RecordOutcome};
use crate::errors::{AppError, AppResult};
use crate::table::{CellValue, ColumnSchema, Table};

pub const DISTANCE_HEADER: &str = "직선거리(km)";
pub const RESULT_HEADER: &str = "결과";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub total_rows: usize,
    pub skipped_rows: usize,
    pub within_threshold: usize,
    pub exceeds_threshold: usize,
    pub failures: usize,
    pub cache_hits: usize,
    pub remote_calls: usize,
}

impl BatchStats {
    fn with_total(total_rows: usize) -> Self {
        Self {
            total_rows,
            ..Self::default()
        }
    }

    fn record(&mut self, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::Distance {
                classification: Classification::WithinThreshold,
                ..
            } => self.within_threshold += 1,
            RecordOutcome::Distance {
                classification: Classification::ExceedsThreshold,
                ..
            } => self.exceeds_threshold += 1,
            RecordOutcome::Failure(_) => self.failures += 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchProgress {
    pub total_rows: usize,
    pub processed: usize,
}

#[derive(Debug, Clone)]
pub struct BatchOutput {
    pub table: Table,
    pub stats: BatchStats,
}

pub type ProgressObserver = Arc<dyn Fn(BatchProgress) + Send + Sync>;

pub struct BatchPipeline {
    annotator: RecordAnnotator,
    schema: ColumnSchema,
}

impl BatchPipeline {
    pub fn new(annotator: RecordAnnotator, schema: ColumnSchema) -> Self {
        Self { annotator, schema }
    }

    pub async fn process(&self, table: Table) -> AppResult<BatchOutput> {
        self.process_with(table, None, None).await
    }

    // Cancel flag is checked before each row; a cancelled batch yields no table.
    pub async fn process_with(
        &self,
        mut table: Table,
        observer: Option<ProgressObserver>,
        cancel_flag: Option<Arc<AtomicBool>>,
    ) -> AppResult<BatchOutput> {
        let width = table.width();
        let total_rows = table.rows.len();
        let threshold_km = self.annotator.threshold_km();
        let before = self.annotator.resolver().stats();
        info!(total_rows, width, threshold_km, "starting distance annotation");

        table.header.push(DISTANCE_HEADER.to_string());
        table.header.push(RESULT_HEADER.to_string());

        let mut stats = BatchStats::with_total(total_rows);
        for (index, slot) in table.rows.iter_mut().enumerate() {
            if let Some(flag) = &cancel_flag {
                if flag.load(Ordering::SeqCst) {
                    let pending = total_rows - index;
                    warn!(processed = index, pending, "distance annotation cancelled");
                    return Err(AppError::Cancelled {
                        processed: index,
                        pending,
                    });
                }
            }

            match slot {
                Some(row) => {
                    let record = self.schema.extract(row);
                    let outcome = self.annotator.annotate(&record).await;
                    debug!(row = index + 1, ?outcome, "row annotated");
                    stats.record(&outcome);
                    write_outcome(row, width, &outcome, threshold_km);
                }
                None => stats.skipped_rows += 1,
            }

            if let Some(callback) = &observer {
                callback(BatchProgress {
                    total_rows,
                    processed: index + 1,
                });
            }
        }

        let after = self.annotator.resolver().stats();
        stats.cache_hits = after.cache_hits - before.cache_hits;
        stats.remote_calls = after.remote_calls - before.remote_calls;
        info!(?stats, "distance annotation finished");

        Ok(BatchOutput { table, stats })
    }
}

fn write_outcome(
    row: &mut Vec<CellValue>,
    width: usize,
    outcome: &RecordOutcome,
    threshold_km: f64,
) {
    if row.len() < width + 2 {
        row.resize(width + 2, CellValue::Empty);
    }
    row[width] = outcome
        .distance_km()
        .map_or(CellValue::Empty, CellValue::Number);
    row[width + 1] = CellValue::Text(outcome.label(threshold_km));
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::cache::GeocodeCache;
    use crate::rate_limit::RateLimiter;
    use crate::resolver::test_support::ScriptedLookup;
    use crate::resolver::AddressResolver;
    use crate::table::{read_csv, write_csv};

    const WIDTH: usize = 47;

    fn pipeline(lookup: Arc<ScriptedLookup>, interval: Duration) -> BatchPipeline {
        let resolver = AddressResolver::new(
            lookup,
            Arc::new(GeocodeCache::new()),
            Arc::new(RateLimiter::new(interval)),
        );
        let annotator = RecordAnnotator::new(Arc::new(resolver), 2.0);
        BatchPipeline::new(annotator, ColumnSchema::default())
    }

    fn header() -> Vec<String> {
        (0..WIDTH).map(|i| format!("col{i}")).collect()
    }

    fn row(id: &str, merchant: (&str, &str), home: (&str, &str)) -> Vec<CellValue> {
        let mut cells = vec![CellValue::Empty; WIDTH];
        cells[0] = CellValue::from(id);
        cells[13] = CellValue::from(merchant.0);
        cells[14] = CellValue::from(merchant.1);
        cells[45] = CellValue::from(home.0);
        cells[46] = CellValue::from(home.1);
        cells
    }

    fn result(table: &Table, index: usize) -> (CellValue, CellValue) {
        let cells = table.rows[index].as_ref().unwrap();
        (cells[WIDTH].clone(), cells[WIDTH + 1].clone())
    }

    #[tokio::test]
    async fn annotates_mixed_batch_in_order() {
        let lookup = Arc::new(
            ScriptedLookup::default()
                .with("서울 중구 세종대로 110", 37.5665, 126.9780)
                .with("서울 종로구 사직로 161", 37.5800, 126.9780)
                .with("서울 종로구", 37.5665, 126.9970),
        );
        let pipeline = pipeline(Arc::clone(&lookup), Duration::ZERO);

        let mut table = Table::new(header());
        table.push_row(row(
            "1",
            ("서울 종로구 사직로 161", ""),
            ("서울 중구 세종대로 110", ""),
        ));
        table.push_row(row("2", ("서울 종로구 사직로 161", ""), ("", " ")));
        table.push_row(row(
            "3",
            ("서울 종로구", "경복궁 매점 2층"),
            ("서울 중구 세종대로 110", ""),
        ));

        let output = pipeline.process(table).await.unwrap();
        let table = output.table;

        assert_eq!(table.header[WIDTH], DISTANCE_HEADER);
        assert_eq!(table.header[WIDTH + 1], RESULT_HEADER);
        assert_eq!(table.rows.len(), 3);

        let (distance, label) = result(&table, 0);
        let CellValue::Number(km) = distance else {
            panic!("expected distance, got {distance:?}");
        };
        assert!((km - 1.5).abs() < 0.01, "got {km}");
        assert_eq!(label, CellValue::Text("2km 이내".into()));

        assert_eq!(
            result(&table, 1),
            (CellValue::Empty, CellValue::Text("자택주소 비어있음".into()))
        );

        let (distance, label) = result(&table, 2);
        let CellValue::Number(km) = distance else {
            panic!("expected fallback distance, got {distance:?}");
        };
        assert!((km - 1.67).abs() < 0.05, "got {km}");
        assert_eq!(label, CellValue::Text("2km 이내".into()));

        for (index, id) in ["1", "2", "3"].iter().enumerate() {
            let cells = table.rows[index].as_ref().unwrap();
            assert_eq!(cells[0], CellValue::Text((*id).into()));
        }

        assert_eq!(
            output.stats,
            BatchStats {
                total_rows: 3,
                skipped_rows: 0,
                within_threshold: 2,
                exceeds_threshold: 0,
                failures: 1,
                cache_hits: 1,
                remote_calls: 4,
            }
        );
        assert!(lookup.calls().contains(&"서울 종로구 경복궁 매점 2층".to_string()));
    }

    #[tokio::test]
    async fn absent_rows_keep_their_position() {
        let lookup = Arc::new(ScriptedLookup::default());
        let pipeline = pipeline(lookup, Duration::ZERO);

        let mut table = Table::new(header());
        table.push_row(row("1", ("", ""), ("", "")));
        table.push_absent();
        table.push_row(row("3", ("x", ""), ("", "")));

        let output = pipeline.process(table).await.unwrap();
        assert_eq!(output.table.rows[1], None);
        assert_eq!(
            result(&output.table, 0).1,
            CellValue::Text("가맹점주소 비어있음".into())
        );
        assert_eq!(
            result(&output.table, 2).1,
            CellValue::Text("자택주소 비어있음".into())
        );
        assert_eq!(output.stats.skipped_rows, 1);
        assert_eq!(output.stats.failures, 2);
    }

    #[tokio::test]
    async fn empty_source_lines_survive_a_csv_round_trip() {
        let lookup = Arc::new(
            ScriptedLookup::default()
                .with("home", 37.5665, 126.9780)
                .with("shop", 37.5800, 126.9780),
        );
        let pipeline = pipeline(lookup, Duration::ZERO);

        let line = |id: &str, merchant: &str, home: &str| {
            row(id, (merchant, ""), (home, ""))
                .iter()
                .map(CellValue::as_text)
                .collect::<Vec<_>>()
                .join(",")
        };
        let input = [
            header().join(","),
            line("1", "shop", "home"),
            String::new(),
            line("3", "", "home"),
        ]
        .join("\n")
            + "\n";

        let table = read_csv(input.as_bytes()).unwrap();
        let output = pipeline.process(table).await.unwrap();
        assert_eq!(output.stats.skipped_rows, 1);

        let mut written = Vec::new();
        write_csv(&output.table, &mut written).unwrap();
        let reread = read_csv(written.as_slice()).unwrap();

        assert_eq!(reread.rows.len(), 3);
        assert_eq!(reread.rows[1], None);
        let id_and_label = |index: usize| {
            let cells = reread.rows[index].as_ref().unwrap();
            (cells[0].as_text(), cells[WIDTH + 1].as_text())
        };
        assert_eq!(id_and_label(0), ("1".to_string(), "2km 이내".to_string()));
        assert_eq!(
            id_and_label(2),
            ("3".to_string(), "가맹점주소 비어있음".to_string())
        );
    }

    #[tokio::test]
    async fn short_rows_are_padded_before_annotation() {
        let pipeline = pipeline(Arc::new(ScriptedLookup::default()), Duration::ZERO);
        let mut table = Table::new(header());
        table.push_row(vec![CellValue::from("only id")]);

        let output = pipeline.process(table).await.unwrap();
        let cells = output.table.rows[0].as_ref().unwrap();
        assert_eq!(cells.len(), WIDTH + 2);
        assert_eq!(
            cells[WIDTH + 1],
            CellValue::Text("가맹점주소 비어있음".into())
        );
    }

    #[tokio::test]
    async fn fresh_lookups_are_throttled_across_rows() {
        let lookup = Arc::new(
            ScriptedLookup::default()
                .with("home", 37.0, 127.0)
                .with("m1", 37.0, 127.01)
                .with("m2", 37.0, 127.02)
                .with("m3", 37.0, 127.03),
        );
        let pipeline = pipeline(lookup, Duration::from_millis(40));

        let mut table = Table::new(header());
        for merchant in ["m1", "m2", "m3"] {
            table.push_row(row(merchant, (merchant, ""), ("home", "")));
        }

        let started = Instant::now();
        let output = pipeline.process(table).await.unwrap();
        assert_eq!(output.stats.remote_calls, 4);
        assert_eq!(output.stats.cache_hits, 2);
        assert!(started.elapsed() >= Duration::from_millis(120));
    }

    #[tokio::test]
    async fn cancellation_stops_and_reports_pending_rows() {
        let pipeline = pipeline(Arc::new(ScriptedLookup::default()), Duration::ZERO);
        let mut table = Table::new(header());
        for id in ["1", "2", "3", "4"] {
            table.push_row(row(id, ("", ""), ("", "")));
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let seen = Arc::new(AtomicUsize::new(0));
        let observer: ProgressObserver = {
            let cancel = Arc::clone(&cancel);
            let seen = Arc::clone(&seen);
            Arc::new(move |progress: BatchProgress| {
                seen.store(progress.processed, Ordering::SeqCst);
                if progress.processed == 2 {
                    cancel.store(true, Ordering::SeqCst);
                }
            })
        };

        let err = pipeline
            .process_with(table, Some(observer), Some(cancel))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Cancelled {
                processed: 2,
                pending: 2
            }
        ));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
