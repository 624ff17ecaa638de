#![allow(dead_code)]

use alloy::primitives::Address;
use angle_role_audit::error::{AuditError, Result};
use angle_role_audit::notify::ReportSink;
use angle_role_audit::probe::{ContractReader, Probe, ProbeValue, Reading, Unreadable};
use angle_role_audit::registry::Registry;
use angle_role_audit::report::Report;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Chain state keyed by `(contract, probe)`. Anything not set reverts.
#[derive(Default)]
pub struct MockChain {
    values: HashMap<(Address, Probe), ProbeValue>,
    reads: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, target: Address, probe: Probe, value: ProbeValue) -> Self {
        self.values.insert((target, probe), value);
        self
    }

    pub fn with_address(self, target: Address, probe: Probe, value: Address) -> Self {
        self.with(target, probe, ProbeValue::Address(value))
    }

    pub fn with_flag(self, target: Address, probe: Probe) -> Self {
        self.with(target, probe, ProbeValue::Bool(true))
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ContractReader for MockChain {
    async fn read(&self, target: Address, probe: Probe) -> Reading {
        self.reads.fetch_add(1, Ordering::Relaxed);
        // Yield so concurrent checks actually interleave.
        tokio::task::yield_now().await;
        self.values.get(&(target, probe)).copied().ok_or(Unreadable)
    }
}

/// Channel stand-in remembering every posted report.
#[derive(Default)]
pub struct MemorySink {
    posted: Mutex<Vec<Report>>,
    fail_posts: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_posts: true,
            ..Self::default()
        }
    }

    pub fn posted(&self) -> Vec<Report> {
        self.posted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn latest(&self, title: &str) -> Result<Option<String>> {
        Ok(self
            .posted
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.title == title)
            .map(|r| r.body.clone()))
    }

    async fn post(&self, report: &Report) -> Result<()> {
        if self.fail_posts {
            return Err(AuditError::Notify("channel unavailable".to_string()));
        }
        self.posted.lock().unwrap().push(report.clone());
        Ok(())
    }
}

pub fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

pub fn hex(address: Address) -> String {
    format!("{address:#x}")
}

pub fn registry(json: serde_json::Value) -> Registry {
    Registry::from_json_str(&json.to_string()).unwrap()
}
