// SPDX-License-Identifier: Apache-2.0

//! In-memory audit sink
//!
//! Keeps records in a bounded buffer, with query and statistics helpers.
//! Records are never evicted: once full, every write fails. Tests can
//! switch the sink off to simulate an unavailable audit store.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sqlgate_core::{AuditError, AuditKind, AuditRecord, OperationCategory, PolicyVerdict};
use tracing::info;

use super::audit::AuditSink;

/// Default number of records held before writes are refused
const DEFAULT_CAPACITY: usize = 1000;

/// Filter for [`MemoryAuditSink::get_entries`]; unset fields match anything
#[derive(Debug, Clone, Default)]
pub struct AuditQuery<'a> {
    pub request_id: Option<&'a str>,
    pub verdict: Option<PolicyVerdict>,
    pub category: Option<OperationCategory>,
    pub kind: Option<AuditKind>,
    /// Case-insensitive match on execution context or rule id
    pub search: Option<&'a str>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
}

impl AuditQuery<'_> {
    fn matches(&self, e: &AuditRecord) -> bool {
        if let Some(request_id) = self.request_id {
            if e.request_id != request_id {
                return false;
            }
        }
        if let Some(verdict) = self.verdict {
            if e.verdict != verdict {
                return false;
            }
        }
        if let Some(category) = self.category {
            if e.category != Some(category) {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if e.kind != kind {
                return false;
            }
        }
        if let Some(search) = self.search {
            let search = search.to_lowercase();
            if !e.execution_context.to_lowercase().contains(&search)
                && !e.matched_rule.to_lowercase().contains(&search)
            {
                return false;
            }
        }
        if let Some(from) = self.from_date {
            if e.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to_date {
            if e.timestamp > to {
                return false;
            }
        }
        true
    }
}

pub struct MemoryAuditSink {
    entries: RwLock<VecDeque<AuditRecord>>,
    capacity: usize,
    available: AtomicBool,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
            available: AtomicBool::new(true),
        }
    }

    /// When false, every write fails with [`AuditError::Unavailable`]
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        info!("Memory audit sink {}", if available { "available" } else { "unavailable" });
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Every retained record, oldest first
    pub fn records(&self) -> Vec<AuditRecord> {
        self.entries.read().iter().cloned().collect()
    }

    /// Matching records, most recent first
    pub fn get_entries(&self, limit: usize, offset: usize, query: &AuditQuery<'_>) -> Vec<AuditRecord> {
        self.entries
            .read()
            .iter()
            .rev()
            .filter(|e| query.matches(e))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn get_stats(&self) -> AuditStats {
        let entries = self.entries.read();
        let last_hour = Utc::now() - Duration::hours(1);

        let mut stats = AuditStats::default();
        for entry in entries.iter() {
            stats.total += 1;

            match entry.verdict {
                PolicyVerdict::Allow => stats.allowed += 1,
                PolicyVerdict::Deny => stats.denied += 1,
            }

            match entry.kind {
                AuditKind::Decision => {}
                AuditKind::EnforcementDisabled => stats.enforcement_disabled += 1,
                AuditKind::Rejected => stats.rejected += 1,
            }

            if entry.timestamp >= last_hour {
                stats.last_hour += 1;
            }

            if let Some(category) = entry.category {
                *stats.by_category.entry(category.to_string()).or_insert(0) += 1;
            }
            *stats
                .by_context
                .entry(entry.execution_context.clone())
                .or_insert(0) += 1;
        }

        stats
    }

}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(AuditError::unavailable("memory audit sink is offline"));
        }

        let mut entries = self.entries.write();
        if entries.len() >= self.capacity {
            return Err(AuditError::unavailable(format!(
                "memory audit sink is full ({} records)",
                self.capacity
            )));
        }
        entries.push_back(record);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Audit statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditStats {
    pub total: u64,
    pub allowed: u64,
    pub denied: u64,
    pub enforcement_disabled: u64,
    pub rejected: u64,
    pub last_hour: u64,
    pub by_category: HashMap<String, u64>,
    pub by_context: HashMap<String, u64>,
}
