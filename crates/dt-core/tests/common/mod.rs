//! Shared fixtures for dt-core integration tests.

#![allow(dead_code)]

use dt_common::{
    Behavior, CallRecord, ModuleError, ModuleResult, ProcessRecord, ResultAggregate, CATEGORY_FILE,
};
use dt_core::plugin::{ModuleContext, ModuleDescriptor, ProcessingDescriptor, ProcessingModule};
use dt_core::signatures::{Signature, SignatureDescriptor, SignatureMeta, Verdict};
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Processing module writing a fixed value under a key.
pub struct KeyWriter {
    pub key: String,
    pub value: Value,
}

impl ProcessingModule for KeyWriter {
    fn key(&self) -> &str {
        &self.key
    }

    fn run(&mut self, _: &ModuleContext<'_>, _: &ResultAggregate) -> ModuleResult<Value> {
        Ok(self.value.clone())
    }
}

pub fn writer(name: &str, order: i32, key: &str, value: Value) -> ProcessingDescriptor {
    let key = key.to_string();
    ModuleDescriptor::new(name, move || {
        Ok(Box::new(KeyWriter {
            key: key.clone(),
            value: value.clone(),
        }) as Box<dyn ProcessingModule>)
    })
    .with_order(order)
}

pub fn broken(name: &str, order: i32) -> ProcessingDescriptor {
    ModuleDescriptor::new(name, || Err(ModuleError::other("import failed"))).with_order(order)
}

/// A trace of `n` calls in one process.
pub fn trace(n: usize) -> ResultAggregate {
    let calls = (0..n)
        .map(|i| CallRecord::new(format!("Api{i}"), "misc").at(i as u64))
        .collect();
    ResultAggregate::new(CATEGORY_FILE)
        .with_behavior(Behavior::new(vec![ProcessRecord::new("sample.exe", 4242).with_calls(calls)]))
}

/// A trace over several processes, each with its own API sequence.
pub fn processes(spec: &[(&str, &[&str])]) -> ResultAggregate {
    let records = spec
        .iter()
        .enumerate()
        .map(|(pid, (name, apis))| {
            let calls = apis.iter().map(|api| CallRecord::new(*api, "misc")).collect();
            ProcessRecord::new(*name, 1000 + pid as u32).with_calls(calls)
        })
        .collect();
    ResultAggregate::new(CATEGORY_FILE).with_behavior(Behavior::new(records))
}

/// Everything observed by [`Recorded`] signatures.
#[derive(Debug, Default)]
pub struct Journal {
    pub created: Vec<(String, u32)>,
    pub on_call: Vec<(String, String)>,
    pub on_complete: Vec<String>,
    /// (signature, calls read in run)
    pub runs: Vec<(String, usize)>,
}

pub type SharedJournal = Arc<Mutex<Journal>>;

/// Scripted signature that reports to a journal.
pub struct Recorded {
    meta: SignatureMeta,
    journal: SharedJournal,
    resolve_at: Option<(usize, Verdict)>,
    complete: Option<Verdict>,
    batch: Option<bool>,
    seen: usize,
}

impl Signature for Recorded {
    fn meta(&self) -> &SignatureMeta {
        &self.meta
    }

    fn run(&mut self, results: &ResultAggregate) -> ModuleResult<bool> {
        let read: usize = results.processes().iter().map(|p| p.calls().count()).sum();
        self.journal
            .lock()
            .unwrap()
            .runs
            .push((self.meta.name.clone(), read));
        self.batch.ok_or(ModuleError::NotImplemented)
    }

    fn on_call(&mut self, call: &CallRecord, _: &ProcessRecord) -> ModuleResult<Verdict> {
        self.seen += 1;
        self.journal
            .lock()
            .unwrap()
            .on_call
            .push((self.meta.name.clone(), call.api.clone()));
        match self.resolve_at {
            Some((n, verdict)) if n == self.seen => Ok(verdict),
            _ => Ok(Verdict::Inconclusive),
        }
    }

    fn on_complete(&mut self) -> ModuleResult<Verdict> {
        self.journal
            .lock()
            .unwrap()
            .on_complete
            .push(self.meta.name.clone());
        self.complete.ok_or(ModuleError::NotImplemented)
    }
}

/// Descriptor for a [`Recorded`] signature.
pub fn recorded(
    meta: SignatureMeta,
    journal: &SharedJournal,
    resolve_at: Option<(usize, Verdict)>,
    complete: Option<Verdict>,
    batch: Option<bool>,
) -> SignatureDescriptor {
    let journal = Arc::clone(journal);
    SignatureDescriptor::new(meta, move |meta| {
        journal
            .lock()
            .unwrap()
            .created
            .push((meta.name.clone(), meta.severity));
        Ok(Box::new(Recorded {
            meta,
            journal: Arc::clone(&journal),
            resolve_at,
            complete,
            batch,
            seen: 0,
        }) as Box<dyn Signature>)
    })
}
