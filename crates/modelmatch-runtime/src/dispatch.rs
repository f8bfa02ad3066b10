//! Dispatch engine: one generation call per (data point, backend) pair.
//!
//! Prompts are rendered for every data point before the first call goes
//! out, so a template problem costs nothing. Calls then run through a
//! bounded pool; each call owns exactly one output slot, keyed by
//! `(data_point_index, backend_id)`. A failed call becomes a failure record
//! in its own slot and never disturbs the others.

use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use modelmatch_core::{ConfigError, DataPointOutputs, InputData, OutputRecord};

use crate::backend::Backend;

/// Upper bound for the environment-derived default pool size.
const MAX_DEFAULT_CONCURRENCY: usize = 32;

/// Pool size used when none is configured: available cores plus four, capped.
pub fn default_concurrency() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cores + 4).min(MAX_DEFAULT_CONCURRENCY)
}

/// Fans generation calls out to backends under a concurrency bound.
#[derive(Debug, Clone)]
pub struct DispatchEngine {
    concurrency: usize,
}

impl DispatchEngine {
    /// Create an engine; a bound of zero is raised to one.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Produce the full raw output matrix.
    ///
    /// Returns one [`DataPointOutputs`] per data point, in input order, each
    /// holding exactly one record per backend. Only configuration problems
    /// (unrenderable template, duplicate backend ids) are errors; they are
    /// reported before any backend is called.
    pub async fn dispatch(
        &self,
        input: &InputData,
        backends: &[Arc<dyn Backend>],
    ) -> Result<Vec<DataPointOutputs>, ConfigError> {
        let mut seen = HashSet::new();
        for backend in backends {
            if !seen.insert(backend.id()) {
                return Err(ConfigError::InvalidInput(format!(
                    "backend '{}' is listed more than once",
                    backend.id()
                )));
            }
        }

        let prompts = input.render_prompts()?;

        let total = prompts.len() * backends.len();
        tracing::info!(
            data_points = prompts.len(),
            backends = backends.len(),
            calls = total,
            concurrency = self.concurrency,
            "Dispatching generation calls"
        );

        let jobs = prompts.iter().enumerate().flat_map(|(index, prompt)| {
            backends.iter().map(move |backend| {
                let backend = Arc::clone(backend);
                async move {
                    let started = Instant::now();
                    let record = match backend.generate(prompt).await {
                        Ok(text) => {
                            tracing::debug!(
                                backend = backend.id(),
                                data_point = index,
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                "Generation succeeded"
                            );
                            OutputRecord::success(text)
                        }
                        Err(e) => {
                            tracing::warn!(
                                backend = backend.id(),
                                data_point = index,
                                error = %e,
                                "Generation failed"
                            );
                            OutputRecord::failure(e)
                        }
                    };
                    (index, backend.id().to_string(), record)
                }
            })
        });

        let results: Vec<(usize, String, OutputRecord)> = stream::iter(jobs)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut slots: Vec<BTreeMap<String, OutputRecord>> = vec![BTreeMap::new(); prompts.len()];
        for (index, backend_id, record) in results {
            slots[index].insert(backend_id, record);
        }

        let failures = slots
            .iter()
            .flat_map(|s| s.values())
            .filter(|r| !r.is_success())
            .count();
        tracing::info!(calls = total, failures = failures, "Dispatch complete");

        Ok(input
            .data
            .iter()
            .zip(prompts)
            .zip(slots)
            .enumerate()
            .map(|(index, ((data, prompt), outputs))| DataPointOutputs {
                data_point_index: index,
                data: data.clone(),
                prompt,
                outputs,
            })
            .collect())
    }
}

impl Default for DispatchEngine {
    fn default() -> Self {
        Self::new(default_concurrency())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use async_trait::async_trait;
    use modelmatch_core::DataPoint;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct EchoBackend {
        id: String,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl EchoBackend {
        fn new(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Backend for EchoBackend {
        fn id(&self) -> &str {
            &self.id
        }

        async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(format!("{}:{}", self.id, prompt))
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl Backend for FailingBackend {
        fn id(&self) -> &str {
            "broken"
        }

        async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
            Err(ProviderError::ApiError {
                status: 500,
                message: "upstream exploded".to_string(),
            })
        }
    }

    fn input(points: &[&str]) -> InputData {
        InputData::new(
            "Say {data}",
            points.iter().map(|p| DataPoint::from(*p)).collect(),
        )
    }

    #[tokio::test]
    async fn test_every_pair_has_one_record() {
        let a = EchoBackend::new("a");
        let backends: Vec<Arc<dyn Backend>> = vec![a.clone(), Arc::new(FailingBackend)];
        let outputs = DispatchEngine::new(4)
            .dispatch(&input(&["x", "y", "z"]), &backends)
            .await
            .unwrap();

        assert_eq!(outputs.len(), 3);
        for (i, point) in outputs.iter().enumerate() {
            assert_eq!(point.data_point_index, i);
            let keys: Vec<_> = point.outputs.keys().map(String::as_str).collect();
            assert_eq!(keys, vec!["a", "broken"]);
        }
        assert_eq!(a.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failure_recorded_without_affecting_others() {
        let backends: Vec<Arc<dyn Backend>> = vec![EchoBackend::new("a"), Arc::new(FailingBackend)];
        let outputs = DispatchEngine::new(2)
            .dispatch(&input(&["x"]), &backends)
            .await
            .unwrap();

        let point = &outputs[0];
        assert_eq!(point.prompt, "Say x");
        assert_eq!(point.outputs["a"], OutputRecord::success("a:Say x"));
        let failure = point.outputs["broken"].to_string();
        assert!(failure.starts_with("ERROR: "));
        assert!(failure.contains("upstream exploded"));
    }

    #[tokio::test]
    async fn test_template_error_before_any_call() {
        let a = EchoBackend::new("a");
        let backends: Vec<Arc<dyn Backend>> = vec![a.clone(), EchoBackend::new("b")];
        let bad = InputData::new("No placeholder", vec![DataPoint::from("x")]);

        let result = DispatchEngine::new(2).dispatch(&bad, &backends).await;
        assert!(matches!(result, Err(ConfigError::Template { index: 0, .. })));
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_duplicate_backend_rejected() {
        let a = EchoBackend::new("a");
        let backends: Vec<Arc<dyn Backend>> = vec![a.clone(), a.clone()];
        let result = DispatchEngine::new(2).dispatch(&input(&["x"]), &backends).await;
        assert!(matches!(result, Err(ConfigError::InvalidInput(_))));
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sequential_and_parallel_agree() {
        let data = input(&["one", "two", "three", "four"]);
        let make = || -> Vec<Arc<dyn Backend>> {
            vec![EchoBackend::new("a"), EchoBackend::new("b"), Arc::new(FailingBackend)]
        };

        let sequential = DispatchEngine::new(1).dispatch(&data, &make()).await.unwrap();
        let parallel = DispatchEngine::new(12).dispatch(&data, &make()).await.unwrap();
        assert_eq!(sequential, parallel);
    }

    #[tokio::test]
    async fn test_concurrency_bound_respected() {
        let a = EchoBackend::new("a");
        let backends: Vec<Arc<dyn Backend>> = vec![a.clone()];
        DispatchEngine::new(2)
            .dispatch(&input(&["1", "2", "3", "4", "5", "6"]), &backends)
            .await
            .unwrap();
        assert!(a.peak.load(Ordering::SeqCst) <= 2);

        let b = EchoBackend::new("b");
        let backends: Vec<Arc<dyn Backend>> = vec![b.clone()];
        DispatchEngine::new(1)
            .dispatch(&input(&["1", "2", "3"]), &backends)
            .await
            .unwrap();
        assert_eq!(b.peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_default_concurrency_bounds() {
        let n = default_concurrency();
        assert!(n >= 5);
        assert!(n <= MAX_DEFAULT_CONCURRENCY);
        assert_eq!(DispatchEngine::new(0).concurrency(), 1);
    }
}
