//! Fakes and probes for exercising stages without real modules.
//!
//! Probes are cheap handles over shared counters; clone one into a
//! descriptor and read it back after the stage ran.

use crate::plugin::{
    AuxiliaryContext, AuxiliaryDescriptor, AuxiliaryModule, Feed, FeedDescriptor, ModuleContext,
    ModuleDescriptor, ProcessingDescriptor, ProcessingModule, ReportModule, ReportingDescriptor,
};
use crate::signatures::{Signature, SignatureDescriptor, SignatureMeta, Verdict};
use dt_common::{
    Behavior, CallRecord, ModuleError, ModuleResult, ProcessRecord, ResultAggregate, CATEGORY_FILE,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

/// Assert that two floating point numbers are approximately equal.
#[macro_export]
macro_rules! assert_approx_eq {
    ($a:expr, $b:expr) => {
        $crate::assert_approx_eq!($a, $b, 1e-9_f64)
    };
    ($a:expr, $b:expr, $epsilon:expr) => {{
        let a: f64 = $a;
        let b: f64 = $b;
        let eps: f64 = $epsilon;
        if (a - b).abs() > eps {
            panic!("assertion failed: `(left ~= right)` (left: `{a}`, right: `{b}`, epsilon: `{eps}`)");
        }
    }};
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Rebuild an equivalent error for each invocation.
fn replicate(err: &ModuleError) -> ModuleError {
    match err {
        ModuleError::Dependency(m) => ModuleError::Dependency(m.clone()),
        ModuleError::Processing(m) => ModuleError::Processing(m.clone()),
        ModuleError::Report(m) => ModuleError::Report(m.clone()),
        ModuleError::NotImplemented => ModuleError::NotImplemented,
        other => ModuleError::Other(other.to_string()),
    }
}

/// A `file` aggregate with one process holding `n` calls.
pub fn aggregate_with_calls(n: usize) -> ResultAggregate {
    let calls = (0..n)
        .map(|i| CallRecord::new(format!("Api{i}"), "misc").at(i as u64))
        .collect();
    ResultAggregate::new(CATEGORY_FILE)
        .with_behavior(Behavior::new(vec![ProcessRecord::new("sample.exe", 1000).with_calls(calls)]))
}

// ============================================================================
// Processing
// ============================================================================

struct FakeProcessing {
    key: String,
    outcome: Result<Value, Arc<ModuleError>>,
}

impl ProcessingModule for FakeProcessing {
    fn key(&self) -> &str {
        &self.key
    }

    fn run(&mut self, _: &ModuleContext<'_>, _: &ResultAggregate) -> ModuleResult<Value> {
        match &self.outcome {
            Ok(value) => Ok(value.clone()),
            Err(e) => Err(replicate(e)),
        }
    }
}

/// Processing module returning `value` under `key`.
pub fn fake_processing(name: &str, order: i32, key: &str, value: impl Into<Value>) -> ProcessingDescriptor {
    let key = key.to_string();
    let value = value.into();
    ModuleDescriptor::new(name, move || {
        Ok(Box::new(FakeProcessing {
            key: key.clone(),
            outcome: Ok(value.clone()),
        }) as Box<dyn ProcessingModule>)
    })
    .with_order(order)
}

/// Processing module whose run fails with `err`.
pub fn raising_processing(name: &str, order: i32, err: ModuleError) -> ProcessingDescriptor {
    let key = name.to_string();
    let err = Arc::new(err);
    ModuleDescriptor::new(name, move || {
        Ok(Box::new(FakeProcessing {
            key: key.clone(),
            outcome: Err(Arc::clone(&err)),
        }) as Box<dyn ProcessingModule>)
    })
    .with_order(order)
}

/// Processing module whose constructor fails.
pub fn failing_processing(name: &str, order: i32) -> ProcessingDescriptor {
    ModuleDescriptor::new(name, || Err(ModuleError::other("constructor failed"))).with_order(order)
}

// ============================================================================
// Reporting
// ============================================================================

struct FakeReport {
    outcome: Option<Arc<ModuleError>>,
    probe: Option<ReportProbe>,
}

impl ReportModule for FakeReport {
    fn run(&mut self, ctx: &ModuleContext<'_>, results: &ResultAggregate) -> ModuleResult<()> {
        if let Some(probe) = &self.probe {
            let mut inner = lock(&probe.inner);
            inner.runs += 1;
            inner.last_seen = Some(results.clone());
            inner.last_path = Some(ctx.analysis_path.to_path_buf());
        }
        match &self.outcome {
            None => Ok(()),
            Some(e) => Err(replicate(e)),
        }
    }
}

/// Report module that succeeds without doing anything.
pub fn fake_report(name: &str, order: i32) -> ReportingDescriptor {
    ModuleDescriptor::new(name, || {
        Ok(Box::new(FakeReport {
            outcome: None,
            probe: None,
        }) as Box<dyn ReportModule>)
    })
    .with_order(order)
}

/// Report module whose run fails with `err`.
pub fn raising_report(name: &str, order: i32, err: ModuleError) -> ReportingDescriptor {
    let err = Arc::new(err);
    ModuleDescriptor::new(name, move || {
        Ok(Box::new(FakeReport {
            outcome: Some(Arc::clone(&err)),
            probe: None,
        }) as Box<dyn ReportModule>)
    })
    .with_order(order)
}

#[derive(Debug, Default)]
struct ReportState {
    runs: usize,
    last_seen: Option<ResultAggregate>,
    last_path: Option<PathBuf>,
}

/// Records what a report module was handed.
#[derive(Debug, Clone, Default)]
pub struct ReportProbe {
    inner: Arc<Mutex<ReportState>>,
}

impl ReportProbe {
    pub fn descriptor(&self, name: &str, order: i32) -> ReportingDescriptor {
        let probe = self.clone();
        ModuleDescriptor::new(name, move || {
            Ok(Box::new(FakeReport {
                outcome: None,
                probe: Some(probe.clone()),
            }) as Box<dyn ReportModule>)
        })
        .with_order(order)
    }

    pub fn runs(&self) -> usize {
        lock(&self.inner).runs
    }

    pub fn last_seen(&self) -> Option<ResultAggregate> {
        lock(&self.inner).last_seen.clone()
    }

    pub fn last_path(&self) -> Option<PathBuf> {
        lock(&self.inner).last_path.clone()
    }
}

// ============================================================================
// Auxiliary
// ============================================================================

/// How a fake auxiliary module responds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxiliaryBehavior {
    Ok,
    FailStart,
    FailStop,
    /// No start or stop hook.
    NotApplicable,
}

#[derive(Debug, Default)]
struct AuxiliaryState {
    starts: usize,
    stops: usize,
    last_context: Option<AuxiliaryContext>,
}

/// Counts start/stop invocations.
#[derive(Debug, Clone, Default)]
pub struct AuxiliaryProbe {
    inner: Arc<Mutex<AuxiliaryState>>,
}

impl AuxiliaryProbe {
    pub fn starts(&self) -> usize {
        lock(&self.inner).starts
    }

    pub fn stops(&self) -> usize {
        lock(&self.inner).stops
    }

    pub fn last_context(&self) -> Option<AuxiliaryContext> {
        lock(&self.inner).last_context.clone()
    }
}

struct FakeAuxiliary {
    behavior: AuxiliaryBehavior,
    probe: AuxiliaryProbe,
}

impl AuxiliaryModule for FakeAuxiliary {
    fn start(&mut self, ctx: &AuxiliaryContext) -> ModuleResult<()> {
        {
            let mut inner = lock(&self.probe.inner);
            inner.starts += 1;
            inner.last_context = Some(ctx.clone());
        }
        match self.behavior {
            AuxiliaryBehavior::FailStart => Err(ModuleError::other("could not bind interface")),
            AuxiliaryBehavior::NotApplicable => Err(ModuleError::NotImplemented),
            AuxiliaryBehavior::Ok | AuxiliaryBehavior::FailStop => Ok(()),
        }
    }

    fn stop(&mut self, _: &AuxiliaryContext) -> ModuleResult<()> {
        lock(&self.probe.inner).stops += 1;
        match self.behavior {
            AuxiliaryBehavior::FailStop => Err(ModuleError::other("process already gone")),
            AuxiliaryBehavior::NotApplicable => Err(ModuleError::NotImplemented),
            _ => Ok(()),
        }
    }
}

pub fn fake_auxiliary(name: &str, behavior: AuxiliaryBehavior, probe: &AuxiliaryProbe) -> AuxiliaryDescriptor {
    let probe = probe.clone();
    ModuleDescriptor::new(name, move || {
        Ok(Box::new(FakeAuxiliary {
            behavior,
            probe: probe.clone(),
        }) as Box<dyn AuxiliaryModule>)
    })
}

/// Auxiliary module whose constructor fails.
pub fn failing_auxiliary(name: &str) -> AuxiliaryDescriptor {
    ModuleDescriptor::new(name, || Err(ModuleError::dependency("tcpdump not installed")))
}

// ============================================================================
// Signatures
// ============================================================================

#[derive(Debug, Default)]
struct SignatureState {
    instances: usize,
    on_calls: usize,
    on_completes: usize,
    runs: usize,
    seen_apis: Vec<String>,
    observed_severities: Vec<u32>,
    calls_seen_in_run: Vec<usize>,
}

/// Counts hook invocations across every instance of a fake signature.
#[derive(Debug, Clone, Default)]
pub struct SignatureProbe {
    inner: Arc<Mutex<SignatureState>>,
}

impl SignatureProbe {
    pub fn instances(&self) -> usize {
        lock(&self.inner).instances
    }

    pub fn on_calls(&self) -> usize {
        lock(&self.inner).on_calls
    }

    pub fn on_completes(&self) -> usize {
        lock(&self.inner).on_completes
    }

    pub fn runs(&self) -> usize {
        lock(&self.inner).runs
    }

    pub fn seen_apis(&self) -> Vec<String> {
        lock(&self.inner).seen_apis.clone()
    }

    /// Severity each instance was constructed with.
    pub fn observed_severities(&self) -> Vec<u32> {
        lock(&self.inner).observed_severities.clone()
    }

    /// Calls each batch run read through its cursors.
    pub fn calls_seen_in_run(&self) -> Vec<usize> {
        lock(&self.inner).calls_seen_in_run.clone()
    }
}

type Predicate = Arc<dyn Fn(&ResultAggregate) -> bool + Send + Sync>;
type ErrorFactory = Arc<dyn Fn() -> ModuleError + Send + Sync>;

#[derive(Clone)]
enum BatchOutcome {
    NotImplemented,
    Fixed(bool),
    When(Predicate),
    Error(ErrorFactory),
}

/// Builder for a scripted signature.
#[derive(Clone)]
pub struct FakeSignature {
    meta: SignatureMeta,
    resolve_on_call: Option<(usize, Verdict)>,
    on_complete: Option<Verdict>,
    batch: BatchOutcome,
    drain_calls: bool,
    load_fails: bool,
    probe: SignatureProbe,
}

pub fn fake_signature(name: &str) -> FakeSignature {
    FakeSignature {
        meta: SignatureMeta::new(name),
        resolve_on_call: None,
        on_complete: None,
        batch: BatchOutcome::NotImplemented,
        drain_calls: false,
        load_fails: false,
        probe: SignatureProbe::default(),
    }
}

impl FakeSignature {
    pub fn evented(mut self) -> Self {
        self.meta.evented = true;
        self
    }

    pub fn with_meta(mut self, f: impl FnOnce(SignatureMeta) -> SignatureMeta) -> Self {
        self.meta = f(self.meta);
        self
    }

    /// Return `Matched` on the `n`th accepted call.
    pub fn matches_on_call(mut self, n: usize) -> Self {
        self.resolve_on_call = Some((n, Verdict::Matched));
        self
    }

    /// Return `NotMatched` on the `n`th accepted call.
    pub fn rejects_on_call(mut self, n: usize) -> Self {
        self.resolve_on_call = Some((n, Verdict::NotMatched));
        self
    }

    pub fn completes_with(mut self, verdict: Verdict) -> Self {
        self.on_complete = Some(verdict);
        self
    }

    pub fn batch_result(mut self, matched: bool) -> Self {
        self.batch = BatchOutcome::Fixed(matched);
        self
    }

    pub fn matches_when(mut self, f: impl Fn(&ResultAggregate) -> bool + Send + Sync + 'static) -> Self {
        self.batch = BatchOutcome::When(Arc::new(f));
        self
    }

    pub fn batch_error(mut self, f: impl Fn() -> ModuleError + Send + Sync + 'static) -> Self {
        self.batch = BatchOutcome::Error(Arc::new(f));
        self
    }

    /// In `run`, read every process's calls to the end before deciding.
    pub fn drains_calls(mut self) -> Self {
        self.drain_calls = true;
        self
    }

    pub fn fails_to_load(mut self) -> Self {
        self.load_fails = true;
        self
    }

    pub fn probe(mut self, probe: &SignatureProbe) -> Self {
        self.probe = probe.clone();
        self
    }

    pub fn descriptor(self) -> SignatureDescriptor {
        let script = self.clone();
        SignatureDescriptor::new(self.meta, move |meta| {
            if script.load_fails {
                return Err(ModuleError::other("signature constructor failed"));
            }
            {
                let mut inner = lock(&script.probe.inner);
                inner.instances += 1;
                inner.observed_severities.push(meta.severity);
            }
            Ok(Box::new(ScriptedSignature {
                meta,
                script: script.clone(),
                accepted: 0,
            }) as Box<dyn Signature>)
        })
    }
}

struct ScriptedSignature {
    meta: SignatureMeta,
    script: FakeSignature,
    accepted: usize,
}

impl Signature for ScriptedSignature {
    fn meta(&self) -> &SignatureMeta {
        &self.meta
    }

    fn run(&mut self, results: &ResultAggregate) -> ModuleResult<bool> {
        let mut inner = lock(&self.script.probe.inner);
        inner.runs += 1;
        if self.script.drain_calls {
            let seen = results.processes().iter().map(|p| p.calls().count()).sum();
            inner.calls_seen_in_run.push(seen);
        }
        drop(inner);

        match &self.script.batch {
            BatchOutcome::NotImplemented => Err(ModuleError::NotImplemented),
            BatchOutcome::Fixed(matched) => Ok(*matched),
            BatchOutcome::When(pred) => Ok(pred(results)),
            BatchOutcome::Error(make) => Err(make()),
        }
    }

    fn on_call(&mut self, call: &CallRecord, _: &ProcessRecord) -> ModuleResult<Verdict> {
        self.accepted += 1;
        {
            let mut inner = lock(&self.script.probe.inner);
            inner.on_calls += 1;
            inner.seen_apis.push(call.api.clone());
        }
        match self.script.resolve_on_call {
            Some((n, verdict)) if self.accepted == n => Ok(verdict),
            _ => Ok(Verdict::Inconclusive),
        }
    }

    fn on_complete(&mut self) -> ModuleResult<Verdict> {
        lock(&self.script.probe.inner).on_completes += 1;
        self.script.on_complete.ok_or(ModuleError::NotImplemented)
    }
}

// ============================================================================
// Feeds
// ============================================================================

/// Records `run(modified)` calls per feed.
#[derive(Debug, Clone, Default)]
pub struct FeedProbe {
    runs: Arc<Mutex<Vec<(String, bool)>>>,
}

impl FeedProbe {
    pub fn runs(&self) -> Vec<(String, bool)> {
        lock(&self.runs).clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModifyHook {
    Missing,
    Ok,
    Fails,
}

/// Scripted feed.
#[derive(Debug, Clone)]
pub struct FakeFeed {
    name: String,
    path: PathBuf,
    updates: bool,
    modify: ModifyHook,
    probe: FeedProbe,
}

impl FakeFeed {
    pub fn new(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            path: PathBuf::from(path),
            updates: false,
            modify: ModifyHook::Missing,
            probe: FeedProbe::default(),
        }
    }

    /// `update()` reports new data.
    pub fn updating(mut self) -> Self {
        self.updates = true;
        self
    }

    pub fn with_modify(mut self) -> Self {
        self.modify = ModifyHook::Ok;
        self
    }

    pub fn failing_modify(mut self) -> Self {
        self.modify = ModifyHook::Fails;
        self
    }

    pub fn descriptor(self, probe: &FeedProbe) -> FeedDescriptor {
        let feed = FakeFeed {
            probe: probe.clone(),
            ..self
        };
        FeedDescriptor::new(feed.name.clone(), move || Ok(Box::new(feed.clone()) as Box<dyn Feed>))
    }
}

impl Feed for FakeFeed {
    fn update(&mut self) -> ModuleResult<bool> {
        Ok(self.updates)
    }

    fn modify(&mut self) -> ModuleResult<()> {
        match self.modify {
            ModifyHook::Missing => Err(ModuleError::NotImplemented),
            ModifyHook::Ok => Ok(()),
            ModifyHook::Fails => Err(ModuleError::processing("malformed download")),
        }
    }

    fn run(&mut self, modified: bool) -> ModuleResult<()> {
        lock(&self.probe.runs).push((self.name.clone(), modified));
        Ok(())
    }

    fn feed_path(&self) -> PathBuf {
        self.path.clone()
    }
}
