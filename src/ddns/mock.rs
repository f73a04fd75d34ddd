//! In-memory DNS provider for testing
//!
//! Holds zones and `AAAA` records in memory. Can be told to accept writes
//! without applying them, to exercise the read-back verification.

use async_trait::async_trait;
use std::sync::Mutex;

use super::{AAAA, DnsProvider, DnsRecord, RecordRequest, Zone};
use crate::ProvisionError;

/// Mock DNS provider
///
/// # Example
/// ```
/// use corpdk_provision::ddns::mock::MockDnsProvider;
///
/// let dns = MockDnsProvider::new()
///     .with_zone("zone-1", "corpdk.com")
///     .with_record("host.corpdk.com", "2001:db8::1", false);
/// assert_eq!(dns.records().len(), 1);
/// ```
pub struct MockDnsProvider {
    zones: Vec<Zone>,
    records: Mutex<Vec<DnsRecord>>,
    writes: Mutex<usize>,
    ignore_writes: bool,
}

impl MockDnsProvider {
    pub fn new() -> Self {
        Self {
            zones: Vec::new(),
            records: Mutex::new(Vec::new()),
            writes: Mutex::new(0),
            ignore_writes: false,
        }
    }

    /// Add a zone
    pub fn with_zone(mut self, id: &str, name: &str) -> Self {
        self.zones.push(Zone {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    /// Add an existing `AAAA` record
    pub fn with_record(self, name: &str, content: &str, proxied: bool) -> Self {
        if let Ok(mut records) = self.records.lock() {
            let id = format!("record-{}", records.len() + 1);
            records.push(DnsRecord {
                id,
                name: name.to_string(),
                record_type: AAAA.to_string(),
                content: content.to_string(),
                proxied,
                ttl: None,
            });
        }
        self
    }

    /// Accept writes without applying them
    pub fn with_ignored_writes(mut self) -> Self {
        self.ignore_writes = true;
        self
    }

    /// Snapshot of all records
    pub fn records(&self) -> Vec<DnsRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Number of create and update calls received
    pub fn writes(&self) -> usize {
        self.writes.lock().map(|w| *w).unwrap_or_default()
    }

    fn count_write(&self) {
        if let Ok(mut writes) = self.writes.lock() {
            *writes += 1;
        }
    }

    fn lock_records(&self) -> Result<std::sync::MutexGuard<'_, Vec<DnsRecord>>, ProvisionError> {
        self.records
            .lock()
            .map_err(|_| ProvisionError::dns("mock", "record store poisoned"))
    }
}

impl Default for MockDnsProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DnsProvider for MockDnsProvider {
    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn find_zones(&self, name: &str) -> Result<Vec<Zone>, ProvisionError> {
        Ok(self.zones.iter().filter(|z| z.name == name).cloned().collect())
    }

    async fn get_zone(&self, zone_id: &str) -> Result<Zone, ProvisionError> {
        self.zones
            .iter()
            .find(|z| z.id == zone_id)
            .cloned()
            .ok_or_else(|| ProvisionError::dns(zone_id, "zone not found"))
    }

    async fn list_aaaa(&self, _zone_id: &str, name: &str) -> Result<Vec<DnsRecord>, ProvisionError> {
        Ok(self
            .lock_records()?
            .iter()
            .filter(|r| r.name == name && r.record_type == AAAA)
            .cloned()
            .collect())
    }

    async fn update_record(
        &self,
        _zone_id: &str,
        record_id: &str,
        record: &RecordRequest,
    ) -> Result<DnsRecord, ProvisionError> {
        self.count_write();
        let mut records = self.lock_records()?;
        let existing = records
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| ProvisionError::dns(&record.name, "record not found"))?;

        let mut updated = existing.clone();
        updated.content = record.content.clone();
        if let Some(proxied) = record.proxied {
            updated.proxied = proxied;
        }

        if !self.ignore_writes {
            *existing = updated.clone();
        }
        Ok(updated)
    }

    async fn create_record(
        &self,
        _zone_id: &str,
        record: &RecordRequest,
    ) -> Result<DnsRecord, ProvisionError> {
        self.count_write();
        let mut records = self.lock_records()?;
        let created = DnsRecord {
            id: format!("record-{}", records.len() + 1),
            name: record.name.clone(),
            record_type: record.record_type.clone(),
            content: record.content.clone(),
            proxied: record.proxied.unwrap_or(false),
            ttl: record.ttl,
        };

        if !self.ignore_writes {
            records.push(created.clone());
        }
        Ok(created)
    }
}
