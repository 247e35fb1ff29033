//! Signature evaluation for one task.
//!
//! Order of work:
//! 1. overlay overrides are applied to every descriptor's metadata
//! 2. evented candidates are instantiated and driven call by call
//! 3. unresolved signatures run once in batch, sorted by order
//! 4. matches are sorted by severity, scored and used for family attribution

use super::consensus::{FamilyConsensus, TokenConsensus};
use super::family::resolve_family;
use super::meta::SignatureMeta;
use super::scoring::malscore;
use super::version::{check_version, VersionGate};
use super::{Signature, SignatureDescriptor, Verdict};
use crate::logging::{event_names, Stage};
use crate::plugin::PluginRegistry;
use dt_common::{ModuleError, ModuleResult, ResultAggregate, StatStage};
use dt_config::Overlay;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Version signatures are gated against.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Counts from one engine run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SignatureSummary {
    /// Evented signatures driven over the trace.
    pub evented: usize,
    /// Signatures run in the batch pass.
    pub batch: usize,
    /// Names of matched signatures, in final order.
    pub matched: Vec<String>,
}

/// A loaded signature with its effective metadata.
struct Candidate<'r> {
    descriptor: &'r SignatureDescriptor,
    meta: SignatureMeta,
    /// Reached a terminal verdict in the evented pass.
    resolved: bool,
}

/// An evented instance still watching the trace.
struct Watcher {
    candidate: usize,
    slot: usize,
    instance: Box<dyn Signature>,
}

/// Runs every registered signature against one aggregate.
pub struct SignatureEngine<'a> {
    registry: &'a PluginRegistry,
    overlay: Overlay,
    version: String,
    consensus: Box<dyn FamilyConsensus>,
}

impl<'a> SignatureEngine<'a> {
    pub fn new(registry: &'a PluginRegistry) -> Self {
        Self {
            registry,
            overlay: Overlay::empty(),
            version: ENGINE_VERSION.to_string(),
            consensus: Box::new(TokenConsensus),
        }
    }

    pub fn with_overlay(mut self, overlay: Overlay) -> Self {
        self.overlay = overlay;
        self
    }

    /// Override the running version used for gating.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_consensus(mut self, consensus: Box<dyn FamilyConsensus>) -> Self {
        self.consensus = consensus;
        self
    }

    /// Evaluate all signatures and write `signatures`, `malscore` and `malfamily`.
    pub fn run(&self, results: &mut ResultAggregate) -> SignatureSummary {
        let mut summary = SignatureSummary::default();
        let mut candidates = self.load_candidates();
        let category = results.target.category.clone();

        results.signatures.clear();

        // Without behavior every evented candidate falls through to batch.
        if results.behavior.is_some() {
            let mut watchers = Vec::new();
            let mut timings: Vec<(String, Duration)> = Vec::new();
            for (idx, candidate) in candidates.iter().enumerate() {
                let meta = &candidate.meta;
                if !meta.enabled || !meta.evented || !meta.applies_to(&category) || !self.version_ok(meta) {
                    continue;
                }
                if let Some(instance) = instantiate(candidate) {
                    watchers.push(Watcher {
                        candidate: idx,
                        slot: timings.len(),
                        instance,
                    });
                    timings.push((meta.name.clone(), Duration::ZERO));
                }
            }

            if !watchers.is_empty() {
                summary.evented = watchers.len();
                self.evented_pass(results, &mut candidates, watchers, &mut timings);
                record_evented_timings(results, &timings);
            }
        }

        summary.batch = self.batch_pass(results, &candidates, &category);

        results.signatures.sort_by_key(|m| m.severity);
        results.malscore = malscore(&results.signatures);
        results.malfamily = resolve_family(results, self.consensus.as_ref());
        summary.matched = results.signatures.iter().map(|m| m.name.clone()).collect();

        info!(
            stage = %Stage::Signatures,
            event = event_names::STAGE_FINISHED,
            evented = summary.evented,
            batch = summary.batch,
            matched = summary.matched.len(),
            malscore = results.malscore,
            malfamily = %results.malfamily,
            "signatures evaluated"
        );
        summary
    }

    /// Descriptors in registration order, with overlay overrides applied.
    fn load_candidates(&self) -> Vec<Candidate<'a>> {
        self.registry
            .signatures()
            .iter()
            .map(|descriptor| {
                let mut meta = descriptor.meta().clone();
                if let Some(overrides) = self.overlay.get(&meta.name) {
                    for err in meta.apply_overrides(overrides) {
                        warn!(
                            stage = %Stage::Signatures,
                            event = event_names::SIGNATURE_OVERLAY_REJECTED,
                            signature = %meta.name,
                            error = %err,
                            "ignoring overlay entry"
                        );
                    }
                }
                Candidate {
                    descriptor,
                    meta,
                    resolved: false,
                }
            })
            .collect()
    }

    fn version_ok(&self, meta: &SignatureMeta) -> bool {
        let gate = check_version(&self.version, meta);
        if !gate.is_compatible() {
            debug!(
                stage = %Stage::Signatures,
                event = event_names::SIGNATURE_VERSION_SKIPPED,
                signature = %meta.name,
                running = %self.version,
                gate = ?gate,
                "signature not compatible with running version"
            );
        }
        gate == VersionGate::Compatible
    }

    fn evented_pass(
        &self,
        results: &mut ResultAggregate,
        candidates: &mut [Candidate<'_>],
        mut watchers: Vec<Watcher>,
        timings: &mut [(String, Duration)],
    ) {
        let mut matched = Vec::new();

        'trace: for process in results.processes() {
            for call in process.calls() {
                if watchers.is_empty() {
                    break 'trace;
                }
                let mut i = 0;
                while i < watchers.len() {
                    let watcher = &mut watchers[i];
                    if !watcher.instance.meta().accepts_call(call, process) {
                        i += 1;
                        continue;
                    }

                    let started = Instant::now();
                    let outcome = watcher.instance.on_call(call, process);
                    timings[watcher.slot].1 += started.elapsed();

                    match verdict_of(watcher.instance.as_ref(), "on_call", outcome) {
                        Verdict::Inconclusive => i += 1,
                        verdict => {
                            let watcher = watchers.remove(i);
                            candidates[watcher.candidate].resolved = true;
                            if verdict == Verdict::Matched {
                                matched.push(watcher.instance.as_result());
                            }
                        }
                    }
                }
            }
        }

        for mut watcher in watchers {
            let started = Instant::now();
            let outcome = watcher.instance.on_complete();
            timings[watcher.slot].1 += started.elapsed();

            candidates[watcher.candidate].resolved = true;
            if verdict_of(watcher.instance.as_ref(), "on_complete", outcome) == Verdict::Matched {
                matched.push(watcher.instance.as_result());
            }
        }

        for record in &matched {
            debug!(stage = %Stage::Signatures, event = event_names::SIGNATURE_MATCHED, signature = %record.name, "evented signature matched");
        }
        results.signatures.extend(matched);
    }

    /// Run unresolved candidates once each. Returns how many ran.
    fn batch_pass(
        &self,
        results: &mut ResultAggregate,
        candidates: &[Candidate<'_>],
        category: &str,
    ) -> usize {
        let mut pending: Vec<&Candidate<'_>> = candidates
            .iter()
            .filter(|c| !c.resolved && c.meta.enabled)
            .collect();
        pending.sort_by_key(|c| c.meta.order);

        let mut ran = 0;
        for candidate in pending {
            if !candidate.meta.applies_to(category) {
                continue;
            }
            let Some(mut instance) = instantiate(candidate) else {
                continue;
            };
            if !instance.meta().enabled || !self.version_ok(instance.meta()) {
                continue;
            }

            // Every call log access hands out a fresh cursor, so each
            // signature sees the trace from its first call.
            let started = Instant::now();
            let outcome = instance.run(results);
            let elapsed = started.elapsed();

            match outcome {
                Ok(hit) => {
                    ran += 1;
                    results
                        .statistics
                        .record(StatStage::Signatures, &candidate.meta.name, elapsed);
                    if hit {
                        debug!(stage = %Stage::Signatures, event = event_names::SIGNATURE_MATCHED, signature = %candidate.meta.name, "batch signature matched");
                        results.signatures.push(instance.as_result());
                    }
                }
                Err(ModuleError::NotImplemented) => {}
                Err(e) => log_signature_failure(&candidate.meta.name, "run", &e),
            }
        }
        ran
    }
}

/// Append evented timings in registration order, skipping signatures that took no time.
fn record_evented_timings(results: &mut ResultAggregate, timings: &[(String, Duration)]) {
    for (name, elapsed) in timings {
        if !elapsed.is_zero() {
            results.statistics.record(StatStage::Signatures, name, *elapsed);
        }
    }
}

fn instantiate(candidate: &Candidate<'_>) -> Option<Box<dyn Signature>> {
    match candidate.descriptor.instantiate(candidate.meta.clone()) {
        Ok(instance) => Some(instance),
        Err(e) => {
            error!(
                stage = %Stage::Signatures,
                event = event_names::MODULE_LOAD_FAILED,
                signature = %candidate.meta.name,
                error = %e,
                "failed to load signature"
            );
            None
        }
    }
}

/// Collapse a hook outcome: failures and missing hooks count as not matched.
fn verdict_of(instance: &dyn Signature, hook: &str, outcome: ModuleResult<Verdict>) -> Verdict {
    match outcome {
        Ok(verdict) => verdict,
        Err(ModuleError::NotImplemented) => Verdict::NotMatched,
        Err(e) => {
            log_signature_failure(&instance.meta().name, hook, &e);
            Verdict::NotMatched
        }
    }
}

fn log_signature_failure(name: &str, hook: &str, err: &ModuleError) {
    error!(
        stage = %Stage::Signatures,
        event = event_names::MODULE_UNEXPECTED_FAILURE,
        signature = name,
        hook,
        error = %err,
        detail = ?err,
        "failed to run signature"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{aggregate_with_calls, fake_signature, SignatureProbe};
    use dt_common::{CallRecord, CATEGORY_FILE, CATEGORY_URL};
    use serde_json::json;

    #[test]
    fn test_no_signatures_scores_zero() {
        let registry = PluginRegistry::new();
        let mut results = aggregate_with_calls(3);
        let summary = SignatureEngine::new(&registry).run(&mut results);
        assert_eq!(summary, SignatureSummary::default());
        assert_eq!(results.malscore, 0.0);
        assert_eq!(results.malfamily, "");
    }

    #[test]
    fn test_on_call_stops_after_terminal_verdict() {
        let probe = SignatureProbe::default();
        let mut registry = PluginRegistry::new();
        registry.register(
            fake_signature("early")
                .evented()
                .matches_on_call(2)
                .probe(&probe)
                .descriptor(),
        );
        let mut results = aggregate_with_calls(5);

        let summary = SignatureEngine::new(&registry).run(&mut results);
        assert_eq!(probe.on_calls(), 2);
        assert_eq!(probe.on_completes(), 0);
        assert_eq!(probe.runs(), 0);
        assert_eq!(summary.matched, ["early"]);
    }

    #[test]
    fn test_unresolved_evented_gets_one_completion() {
        let probe = SignatureProbe::default();
        let mut registry = PluginRegistry::new();
        registry.register(
            fake_signature("watcher")
                .evented()
                .completes_with(Verdict::Matched)
                .probe(&probe)
                .descriptor(),
        );
        let mut results = aggregate_with_calls(4);

        SignatureEngine::new(&registry).run(&mut results);
        assert_eq!(probe.on_calls(), 4);
        assert_eq!(probe.on_completes(), 1);
        assert_eq!(results.signatures.len(), 1);
        assert_eq!(
            results.statistics.names(StatStage::Signatures),
            ["watcher"]
        );
    }

    #[test]
    fn test_evented_without_behavior_falls_to_batch() {
        let probe = SignatureProbe::default();
        let mut registry = PluginRegistry::new();
        registry.register(
            fake_signature("both")
                .evented()
                .batch_result(true)
                .probe(&probe)
                .descriptor(),
        );
        let mut results = ResultAggregate::new(CATEGORY_FILE);

        let summary = SignatureEngine::new(&registry).run(&mut results);
        assert_eq!(summary.evented, 0);
        assert_eq!(probe.runs(), 1);
        assert_eq!(probe.instances(), 1);
        assert_eq!(summary.matched, ["both"]);
    }

    #[test]
    fn test_category_filter_excludes_signature() {
        let probe = SignatureProbe::default();
        let mut registry = PluginRegistry::new();
        registry.register(
            fake_signature("url_only")
                .with_meta(|m| m.filter_analysis_types(&[CATEGORY_URL]))
                .batch_result(true)
                .probe(&probe)
                .descriptor(),
        );
        let mut results = aggregate_with_calls(1);

        SignatureEngine::new(&registry).run(&mut results);
        assert_eq!(probe.runs(), 0);
        assert!(results.signatures.is_empty());
    }

    #[test]
    fn test_api_filter_limits_on_call() {
        let probe = SignatureProbe::default();
        let mut registry = PluginRegistry::new();
        registry.register(
            fake_signature("net")
                .evented()
                .with_meta(|m| m.filter_apis(&["connect"]))
                .probe(&probe)
                .descriptor(),
        );
        let mut results = ResultAggregate::new(CATEGORY_FILE).with_behavior(
            dt_common::Behavior::new(vec![dt_common::ProcessRecord::new("a.exe", 1).with_calls(vec![
                CallRecord::new("NtOpenFile", "filesystem"),
                CallRecord::new("connect", "network"),
                CallRecord::new("send", "network"),
            ])]),
        );

        SignatureEngine::new(&registry).run(&mut results);
        assert_eq!(probe.on_calls(), 1);
        assert_eq!(probe.seen_apis(), ["connect"]);
    }

    #[test]
    fn test_disabled_by_overlay() {
        let probe = SignatureProbe::default();
        let mut registry = PluginRegistry::new();
        registry.register(fake_signature("noisy").batch_result(true).probe(&probe).descriptor());
        let overlay = Overlay::empty().with_entry("noisy", [("enabled".to_string(), json!(false))]);
        let mut results = aggregate_with_calls(1);

        SignatureEngine::new(&registry)
            .with_overlay(overlay)
            .run(&mut results);
        assert_eq!(probe.instances(), 0);
        assert!(results.signatures.is_empty());
    }

    #[test]
    fn test_failing_signature_isolated() {
        let mut registry = PluginRegistry::new();
        registry.register(
            fake_signature("crashes")
                .batch_error(|| ModuleError::other("index out of range"))
                .descriptor(),
        );
        registry.register(fake_signature("fine").batch_result(true).descriptor());
        registry.register(fake_signature("unbuildable").fails_to_load().descriptor());
        let mut results = aggregate_with_calls(1);

        let summary = SignatureEngine::new(&registry).run(&mut results);
        assert_eq!(summary.matched, ["fine"]);
        assert_eq!(
            results.statistics.names(StatStage::Signatures),
            ["fine"]
        );
    }

    #[test]
    fn test_matches_sorted_by_severity_and_scored() {
        let mut registry = PluginRegistry::new();
        registry.register(
            fake_signature("high")
                .with_meta(|m| m.with_severity(3).with_confidence(50).with_weight(2.0))
                .batch_result(true)
                .descriptor(),
        );
        registry.register(
            fake_signature("low")
                .with_meta(|m| m.with_severity(1).with_weight(2.0).with_families(&["zeus"]))
                .batch_result(true)
                .descriptor(),
        );
        let mut results = aggregate_with_calls(1);

        let summary = SignatureEngine::new(&registry).run(&mut results);
        assert_eq!(summary.matched, ["low", "high"]);
        assert_eq!(results.malscore, 3.0);
        assert_eq!(results.malfamily, "Zeus");
    }

    #[test]
    fn test_zero_evented_timings_not_recorded() {
        let mut results = ResultAggregate::new(CATEGORY_FILE);
        let timings = vec![
            ("idle".to_string(), Duration::ZERO),
            ("busy".to_string(), Duration::from_millis(3)),
        ];
        record_evented_timings(&mut results, &timings);
        assert_eq!(results.statistics.names(StatStage::Signatures), ["busy"]);
    }
}

