//! Run orchestration: list fetch, validation, report skeleton, bounded
//! detail fan-out and merge.
//!
//! An [`Aggregator`] drives exactly one run through
//! `Idle -> ListRequested -> ListValidated -> DetailsInFlight -> Complete`,
//! or to `Failed` on a fatal error. Fan-out jobs never touch the report;
//! their outcomes are folded in sequentially once every job has finished.

use crate::error::{DetailError, ListFetchError, PipelineError};
use crate::fanout::run_bounded;
use crate::fetch::ClassSizeFetcher;
use crate::models::{ClassName, ClassReport, RunOutcome};
use crate::source::ClassSource;
use crate::validate::is_valid_list_response;
use indicatif::ProgressBar;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Maximum number of class size requests in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    ListRequested,
    ListValidated,
    DetailsInFlight,
    Complete,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Complete | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::ListRequested => "list-requested",
            RunState::ListValidated => "list-validated",
            RunState::DetailsInFlight => "details-in-flight",
            RunState::Complete => "complete",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Single-use driver for one aggregation run.
pub struct Aggregator {
    source: Arc<dyn ClassSource>,
    concurrency: usize,
    state: RunState,
    progress: Option<ProgressBar>,
}

impl Aggregator {
    pub fn new(source: Arc<dyn ClassSource>) -> Self {
        Self {
            source,
            concurrency: DEFAULT_CONCURRENCY,
            state: RunState::Idle,
            progress: None,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Advance `progress` once per finished class request.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run the pipeline to completion.
    ///
    /// Returns the report with any per-class failures, or the fatal error
    /// that ended the run. A second call returns
    /// [`PipelineError::AlreadyStarted`] without contacting the source.
    pub async fn run(&mut self) -> Result<RunOutcome, PipelineError> {
        if self.state != RunState::Idle {
            warn!("Refusing to rerun aggregator in state {}", self.state);
            return Err(PipelineError::AlreadyStarted);
        }

        match self.drive().await {
            Ok(outcome) => {
                self.transition(RunState::Complete);
                info!(
                    "Run complete: {} classes in {} years, {} failed",
                    outcome.report.len(),
                    outcome.report.year_count(),
                    outcome.failures.len()
                );
                Ok(outcome)
            }
            Err(e) => {
                self.transition(RunState::Failed);
                error!("Run failed: {}", e);
                Err(e)
            }
        }
    }

    async fn drive(&mut self) -> Result<RunOutcome, PipelineError> {
        self.transition(RunState::ListRequested);
        let payload = self.fetch_list().await?;

        self.transition(RunState::ListValidated);
        let names = parse_class_list(&payload)?;
        let mut report = build_skeleton(names)?;

        self.transition(RunState::DetailsInFlight);
        let order: Vec<ClassName> = report.class_names().cloned().collect();
        if let Some(pb) = &self.progress {
            pb.set_length(order.len() as u64);
        }

        let fetcher = ClassSizeFetcher::new(self.source.clone());
        let progress = self.progress.clone();
        let outcomes = run_bounded(&order, self.concurrency, |class| {
            let fetcher = fetcher.clone();
            let progress = progress.clone();
            async move {
                let result = fetcher.fetch(&class).await;
                if let Some(pb) = progress {
                    pb.inc(1);
                }
                result
            }
        })
        .await;

        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }

        let failures = merge_counts(&mut report, &order, outcomes);
        Ok(RunOutcome { report, failures })
    }

    async fn fetch_list(&self) -> Result<Value, ListFetchError> {
        let response = self.source.list_classes().await.map_err(|e| {
            warn!("Class list: transport failure: {}", e);
            ListFetchError::from(e)
        })?;

        if !response.is_success() {
            warn!("Class list: upstream returned HTTP {}", response.status);
            return Err(ListFetchError::Status(response.status));
        }

        match serde_json::from_str::<Value>(&response.body) {
            Ok(payload) if is_valid_list_response(&payload) => Ok(payload),
            _ => {
                warn!("Class list: malformed payload: {}", response.body);
                Err(ListFetchError::MalformedPayload(response.body))
            }
        }
    }

    fn transition(&mut self, next: RunState) {
        debug_assert!(!self.state.is_terminal(), "transition out of terminal state");
        debug!("Run state {} -> {}", self.state, next);
        self.state = next;
    }
}

/// Validate every list element. One bad element rejects the whole list.
fn parse_class_list(payload: &Value) -> Result<Vec<ClassName>, PipelineError> {
    let elements = payload.as_array().map(Vec::as_slice).unwrap_or_default();

    elements
        .iter()
        .map(|element| {
            element.as_str().and_then(ClassName::parse).ok_or_else(|| {
                let token = element
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| element.to_string());
                warn!("Class list: invalid class name {:?}", token);
                PipelineError::InvalidIdentifier { token }
            })
        })
        .collect()
}

fn build_skeleton(names: Vec<ClassName>) -> Result<ClassReport, PipelineError> {
    let mut report = ClassReport::new();
    for name in names {
        report.insert_class(name).map_err(|dup| {
            warn!("Class list: duplicate class name {}", dup);
            PipelineError::DuplicateIdentifier(dup)
        })?;
    }
    debug!(
        "Report skeleton: {} classes, {} years",
        report.len(),
        report.year_count()
    );
    Ok(report)
}

/// Fold fan-out outcomes into the report in class order, returning failures.
fn merge_counts(
    report: &mut ClassReport,
    order: &[ClassName],
    mut outcomes: HashMap<ClassName, Result<u64, DetailError>>,
) -> Vec<DetailError> {
    debug_assert_eq!(outcomes.len(), order.len(), "one outcome per class");
    let mut failures = Vec::new();

    for class in order {
        match outcomes.remove(class) {
            Some(Ok(count)) => {
                let known = report.set_count(class.as_str(), count);
                debug_assert!(known, "count for class {class} outside the report");
            }
            Some(Err(e)) => failures.push(e),
            None => {}
        }
    }

    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::fetch::testing::ScriptedSource;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn aggregator(source: ScriptedSource) -> (Aggregator, Arc<ScriptedSource>) {
        let source = Arc::new(source);
        (Aggregator::new(source.clone()), source)
    }

    fn names<'a>(list: impl IntoIterator<Item = &'a ClassName>) -> Vec<&'a str> {
        list.into_iter().map(ClassName::as_str).collect()
    }

    #[tokio::test]
    async fn test_scenario_all_counts_fetched() {
        let (mut agg, source) = aggregator(
            ScriptedSource::new()
                .with_list(200, r#"["01A","01B","02A"]"#)
                .with_count("01A", 32)
                .with_count("01B", 20)
                .with_count("02A", 25),
        );

        let outcome = assert_ok!(agg.run().await);
        let report = &outcome.report;

        assert_eq!(agg.state(), RunState::Complete);
        assert!(!outcome.is_partial());
        assert_eq!(names(report.year("01").unwrap().class_list()), vec!["01A", "01B"]);
        assert_eq!(names(report.year("02").unwrap().class_list()), vec!["02A"]);
        assert_eq!(report.class("01A").unwrap().count, Some(32));
        assert_eq!(report.class("01B").unwrap().count, Some(20));
        assert_eq!(report.class("02A").unwrap().count, Some(25));
        assert_eq!(source.detail_calls(), 3);
    }

    #[tokio::test]
    async fn test_scenario_invalid_class_name_fails_run() {
        let (mut agg, source) = aggregator(
            ScriptedSource::new()
                .with_list(200, r#"["01A","1A","02A"]"#)
                .with_count("01A", 32),
        );

        let err = assert_err!(agg.run().await);
        assert_eq!(
            err,
            PipelineError::InvalidIdentifier {
                token: "1A".to_string()
            }
        );
        assert_eq!(agg.state(), RunState::Failed);
        assert_eq!(source.detail_calls(), 0);
    }

    #[tokio::test]
    async fn test_scenario_upstream_error_is_partial() {
        let (mut agg, _) = aggregator(
            ScriptedSource::new()
                .with_list(200, r#"["03X","03Y"]"#)
                .with_count("03X", 27)
                .with_detail("03Y", 500, "boom"),
        );

        let outcome = agg.run().await.unwrap();
        assert_eq!(agg.state(), RunState::Complete);
        assert_eq!(outcome.report.class("03X").unwrap().count, Some(27));
        assert_eq!(outcome.report.class("03Y").unwrap().count, None);
        assert_eq!(
            outcome.failures,
            vec![DetailError::UpstreamStatus {
                class: ClassName::parse("03Y").unwrap(),
                status: 500,
            }]
        );
    }

    #[tokio::test]
    async fn test_scenario_list_not_found() {
        let (mut agg, source) = aggregator(
            ScriptedSource::new()
                .with_list(404, "not found")
                .with_count("01A", 1),
        );

        let err = agg.run().await.unwrap_err();
        assert_eq!(err, PipelineError::ListFetch(ListFetchError::Status(404)));
        assert_eq!(agg.state(), RunState::Failed);
        assert_eq!(source.detail_calls(), 0);
    }

    #[tokio::test]
    async fn test_scenario_empty_list() {
        let (mut agg, source) = aggregator(ScriptedSource::new().with_list(200, "[]"));

        let outcome = agg.run().await.unwrap();
        assert_eq!(agg.state(), RunState::Complete);
        assert!(outcome.report.is_empty());
        assert_eq!(outcome.report.year_count(), 0);
        assert!(outcome.failures.is_empty());
        assert_eq!(source.detail_calls(), 0);
    }

    #[tokio::test]
    async fn test_list_transport_error() {
        let (mut agg, _) = aggregator(
            ScriptedSource::new().with_list_error(TransportError::Connect("refused".into())),
        );

        let err = agg.run().await.unwrap_err();
        assert_eq!(
            err,
            PipelineError::ListFetch(ListFetchError::Transport(TransportError::Connect(
                "refused".into()
            )))
        );
    }

    #[tokio::test]
    async fn test_list_payload_must_be_array() {
        for body in [r#"{"classes":["01A"]}"#, "01A", "<html>"] {
            let (mut agg, _) = aggregator(ScriptedSource::new().with_list(200, body));
            let err = agg.run().await.unwrap_err();
            assert_eq!(
                err,
                PipelineError::ListFetch(ListFetchError::MalformedPayload(body.to_string()))
            );
        }
    }

    #[tokio::test]
    async fn test_non_string_element_is_invalid() {
        let (mut agg, _) = aggregator(ScriptedSource::new().with_list(200, r#"["01A", 12]"#));
        let err = agg.run().await.unwrap_err();
        assert_eq!(
            err,
            PipelineError::InvalidIdentifier {
                token: "12".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_duplicate_class_fails_run() {
        let (mut agg, source) =
            aggregator(ScriptedSource::new().with_list(200, r#"["01A","02A","01A"]"#));
        let err = agg.run().await.unwrap_err();
        assert_eq!(
            err,
            PipelineError::DuplicateIdentifier(ClassName::parse("01A").unwrap())
        );
        assert_eq!(source.detail_calls(), 0);
    }

    #[tokio::test]
    async fn test_aggregator_is_single_use() {
        let (mut agg, source) = aggregator(
            ScriptedSource::new()
                .with_list(200, r#"["01A"]"#)
                .with_count("01A", 3),
        );

        agg.run().await.unwrap();
        assert_eq!(agg.run().await.unwrap_err(), PipelineError::AlreadyStarted);
        assert_eq!(agg.state(), RunState::Complete);
        assert_eq!(source.list_calls(), 1);
        assert_eq!(source.detail_calls(), 1);
    }

    #[tokio::test]
    async fn test_default_concurrency_is_respected() {
        let list: Vec<String> = (0..9).map(|i| format!("0{}A", i)).collect();
        let mut source = ScriptedSource::new()
            .with_list(200, &serde_json::to_string(&list).unwrap())
            .with_delay(Duration::from_millis(5));
        for (i, class) in list.iter().enumerate() {
            source = source.with_count(class, i as u64);
        }

        let (mut agg, source) = aggregator(source);
        let outcome = agg.run().await.unwrap();

        assert_eq!(outcome.report.counted(), 9);
        assert_eq!(source.max_in_flight(), DEFAULT_CONCURRENCY);
        let mut requested = source.requested();
        requested.sort();
        assert_eq!(requested, list);
    }

    #[tokio::test]
    async fn test_custom_concurrency() {
        let list: Vec<String> = ["01A", "01B", "01C", "01D", "01E"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut source = ScriptedSource::new()
            .with_list(200, &serde_json::to_string(&list).unwrap())
            .with_delay(Duration::from_millis(5));
        for class in &list {
            source = source.with_count(class, 1);
        }

        let source = Arc::new(source);
        let mut agg = Aggregator::new(source.clone()).with_concurrency(1);
        agg.run().await.unwrap();
        assert_eq!(source.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_mixed_failures_keep_class_order() {
        let (mut agg, _) = aggregator(
            ScriptedSource::new()
                .with_list(200, r#"["02B","01A","02A","01B"]"#)
                .with_detail("02B", 200, r#"{"count":-1}"#)
                .with_count("01A", 30)
                .with_detail_error("02A", TransportError::Timeout("slow".into()))
                .with_count("01B", 19),
        );

        let outcome = agg.run().await.unwrap();
        let failed: Vec<_> = outcome.failures.iter().map(|f| f.class().as_str()).collect();
        assert_eq!(failed, vec!["02B", "02A"]);
        assert_eq!(outcome.failures[0].kind(), "malformed_payload");
        assert_eq!(outcome.failures[1].kind(), "transport");
        assert_eq!(outcome.report.counted(), 2);
        assert_eq!(outcome.report.year("02").unwrap().total(), 0);
        assert_eq!(outcome.report.year("01").unwrap().total(), 49);
    }

    #[tokio::test]
    async fn test_counts_shared_between_indices() {
        let (mut agg, _) = aggregator(
            ScriptedSource::new()
                .with_list(200, r#"["01A","02A","01B"]"#)
                .with_count("01A", 32)
                .with_count("02A", 25),
        );

        let outcome = agg.run().await.unwrap();
        let report = &outcome.report;
        for name in report.class_names() {
            let flat = report.class(name.as_str()).unwrap();
            let grouped = report
                .year(name.year().as_str())
                .unwrap()
                .member(name.as_str())
                .unwrap();
            assert_eq!(flat.count, grouped.count);
            assert!(std::ptr::eq(flat, grouped));
        }
    }

    #[test]
    fn test_state_display() {
        assert_eq!(RunState::DetailsInFlight.to_string(), "details-in-flight");
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::ListValidated.is_terminal());
    }

    #[test]
    fn test_merge_counts_folds_in_class_order() {
        let order: Vec<ClassName> = ["01A", "01B", "02A"]
            .iter()
            .map(|n| ClassName::parse(n).unwrap())
            .collect();
        let mut report = build_skeleton(order.clone()).unwrap();
        let upstream = |class: &ClassName| DetailError::UpstreamStatus {
            class: class.clone(),
            status: 500,
        };
        let outcomes = HashMap::from([
            (order[2].clone(), Err(upstream(&order[2]))),
            (order[0].clone(), Ok(30)),
            (order[1].clone(), Err(upstream(&order[1]))),
        ]);

        let failures = merge_counts(&mut report, &order, outcomes);

        assert_eq!(failures, vec![upstream(&order[1]), upstream(&order[2])]);
        assert_eq!(report.class("01A").unwrap().count, Some(30));
        assert_eq!(report.class("01B").unwrap().count, None);
        assert_eq!(report.counted(), 1);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "outside the report")]
    fn test_merge_counts_rejects_unknown_class() {
        let known = ClassName::parse("01A").unwrap();
        let stray = ClassName::parse("09Z").unwrap();
        let mut report = build_skeleton(vec![known]).unwrap();
        let outcomes = HashMap::from([(stray.clone(), Ok(12))]);

        merge_counts(&mut report, &[stray], outcomes);
    }
}
