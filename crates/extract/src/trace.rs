//! Progress records for whoever is watching a resolution run.
//!
//! The pipeline writes to a [`TraceSink`] at every stage boundary and never looks back: a
//! failing or panicking sink is logged and ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SchemaBuilt,
    SearchComplete,
    PromptBuilt,
    ModelResponse,
    SourcesReconciled,
    StructuredPass,
    HeuristicPass,
    ExtractionComplete,
    ResultAssembled,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SchemaBuilt => "schema_built",
            Self::SearchComplete => "search_complete",
            Self::PromptBuilt => "prompt_built",
            Self::ModelResponse => "model_response",
            Self::SourcesReconciled => "sources_reconciled",
            Self::StructuredPass => "structured_pass",
            Self::HeuristicPass => "heuristic_pass",
            Self::ExtractionComplete => "extraction_complete",
            Self::ResultAssembled => "result_assembled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub sequence: usize,
    pub stage: Stage,
    pub summary: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("trace consumer closed")]
    Closed,
    #[error("trace consumer failed: {0}")]
    Consumer(String),
}

pub trait TraceSink: Send + Sync {
    fn record(&self, record: &TraceRecord) -> Result<(), TraceError>;
}

/// Discards everything.
pub struct NoopSink;

impl TraceSink for NoopSink {
    fn record(&self, _record: &TraceRecord) -> Result<(), TraceError> {
        Ok(())
    }
}

/// Keeps every record in memory, in order.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<TraceRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TraceRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.records().iter().map(|r| r.stage).collect()
    }
}

impl TraceSink for MemorySink {
    fn record(&self, record: &TraceRecord) -> Result<(), TraceError> {
        self.records
            .lock()
            .map_err(|_| TraceError::Consumer("trace buffer poisoned".to_string()))?
            .push(record.clone());
        Ok(())
    }
}

/// Forwards each record to a callback.
pub struct FnSink<F>(pub F);

impl<F> TraceSink for FnSink<F>
where
    F: Fn(&TraceRecord) + Send + Sync,
{
    fn record(&self, record: &TraceRecord) -> Result<(), TraceError> {
        (self.0)(record);
        Ok(())
    }
}

/// Numbers records and shields the pipeline from the sink.
pub struct Tracer<'a> {
    sink: &'a dyn TraceSink,
    next: AtomicUsize,
}

impl<'a> Tracer<'a> {
    pub fn new(sink: &'a dyn TraceSink) -> Self {
        Self {
            sink,
            next: AtomicUsize::new(0),
        }
    }

    pub fn emit(&self, stage: Stage, summary: Value) {
        let summary = match summary {
            Value::Object(_) | Value::Null => summary,
            other => json!({ "value": other }),
        };
        let record = TraceRecord {
            sequence: self.next.fetch_add(1, Ordering::Relaxed),
            stage,
            summary,
        };

        tracing::debug!(
            stage = stage.as_str(),
            sequence = record.sequence,
            summary = %record.summary,
            "trace"
        );

        match catch_unwind(AssertUnwindSafe(|| self.sink.record(&record))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(stage = stage.as_str(), error = %e, "trace sink rejected record");
            }
            Err(_) => {
                tracing::warn!(stage = stage.as_str(), "trace sink panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct FailingSink;

    impl TraceSink for FailingSink {
        fn record(&self, _record: &TraceRecord) -> Result<(), TraceError> {
            Err(TraceError::Closed)
        }
    }

    struct PanickingSink;

    impl TraceSink for PanickingSink {
        fn record(&self, _record: &TraceRecord) -> Result<(), TraceError> {
            panic!("consumer blew up");
        }
    }

    #[test]
    fn test_records_are_ordered() {
        let sink = MemorySink::new();
        let tracer = Tracer::new(&sink);
        tracer.emit(Stage::SchemaBuilt, json!({"keys": 2}));
        tracer.emit(Stage::StructuredPass, json!({"found": true}));

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence, 0);
        assert_eq!(records[1].sequence, 1);
        assert_eq!(sink.stages(), vec![Stage::SchemaBuilt, Stage::StructuredPass]);
        assert_eq!(records[0].summary["keys"], json!(2));
    }

    #[test]
    fn test_failing_sinks_are_ignored() {
        let failing = FailingSink;
        Tracer::new(&failing).emit(Stage::SchemaBuilt, Value::Null);

        let panicking = PanickingSink;
        Tracer::new(&panicking).emit(Stage::SchemaBuilt, Value::Null);
    }

    #[test]
    fn test_fn_sink_and_scalar_summary() {
        let called = AtomicBool::new(false);
        let sink = FnSink(|record: &TraceRecord| {
            assert_eq!(record.summary, json!({"value": 3}));
            called.store(true, Ordering::SeqCst);
        });
        Tracer::new(&sink).emit(Stage::HeuristicPass, json!(3));
        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_record_serializes() {
        let record = TraceRecord {
            sequence: 4,
            stage: Stage::ResultAssembled,
            summary: json!({"attributes": 1}),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["stage"], json!("result_assembled"));
    }
}
