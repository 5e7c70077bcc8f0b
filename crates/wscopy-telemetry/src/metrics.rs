//! Prometheus-backed progress counters for migration runs.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Counters only; a run is a batch job, so gauges would carry no meaning
//!   after it exits.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Metrics registry shared by the engine and the RPC transport.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    objects_copied_total: IntCounter,
    objects_failed_total: IntCounter,
    parents_copied_total: IntCounter,
    parents_reused_total: IntCounter,
    blobs_transferred_total: IntCounter,
    bytes_transferred_total: IntCounter,
    samples_copied_total: IntCounter,
    samples_reused_total: IntCounter,
    links_created_total: IntCounter,
    transport_retries_total: IntCounter,
    transport_retries_by_service: IntCounterVec,
    stage_failures_total: IntCounterVec,
}

/// Point-in-time view of the counters, printed at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Top-level objects saved in the target.
    pub objects_copied: u64,
    /// Top-level objects that failed to copy.
    pub objects_failed: u64,
    /// Parent objects copied on demand.
    pub parents_copied: u64,
    /// Parent references satisfied by an existing copy.
    pub parents_reused: u64,
    /// Blobs moved between blob stores.
    pub blobs_transferred: u64,
    /// Bytes moved between blob stores.
    pub bytes_transferred: u64,
    /// Samples created in the target.
    pub samples_copied: u64,
    /// Samples found in the concordance and not recreated.
    pub samples_reused: u64,
    /// Data links created in the target.
    pub links_created: u64,
    /// Transport-level retries across all services.
    pub transport_retries: u64,
}

impl Metrics {
    /// Construct a registry with every collector registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be built or
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let objects_copied_total = counter(
            &registry,
            "wscopy_objects_copied_total",
            "Objects copied into the target workspace",
        )?;
        let objects_failed_total = counter(
            &registry,
            "wscopy_objects_failed_total",
            "Objects whose migration failed",
        )?;
        let parents_copied_total = counter(
            &registry,
            "wscopy_parents_copied_total",
            "Referenced parent objects copied on demand",
        )?;
        let parents_reused_total = counter(
            &registry,
            "wscopy_parents_reused_total",
            "Referenced parent objects satisfied by an existing copy",
        )?;
        let blobs_transferred_total = counter(
            &registry,
            "wscopy_blobs_transferred_total",
            "Blobs transferred between blob stores",
        )?;
        let bytes_transferred_total = counter(
            &registry,
            "wscopy_bytes_transferred_total",
            "Bytes transferred between blob stores",
        )?;
        let samples_copied_total = counter(
            &registry,
            "wscopy_samples_copied_total",
            "Samples created in the target sample service",
        )?;
        let samples_reused_total = counter(
            &registry,
            "wscopy_samples_reused_total",
            "Samples resolved through the concordance file",
        )?;
        let links_created_total = counter(
            &registry,
            "wscopy_links_created_total",
            "Data links created in the target sample service",
        )?;
        let transport_retries_total = counter(
            &registry,
            "wscopy_transport_retries_total",
            "Transport retries across all services",
        )?;
        let transport_retries_by_service = counter_vec(
            &registry,
            "wscopy_transport_retries_by_service_total",
            "Transport retries by service",
            &["service"],
        )?;
        let stage_failures_total = counter_vec(
            &registry,
            "wscopy_stage_failures_total",
            "Migration failures by stage",
            &["stage"],
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                objects_copied_total,
                objects_failed_total,
                parents_copied_total,
                parents_reused_total,
                blobs_transferred_total,
                bytes_transferred_total,
                samples_copied_total,
                samples_reused_total,
                links_created_total,
                transport_retries_total,
                transport_retries_by_service,
                stage_failures_total,
            }),
        })
    }

    /// Count a copied top-level object.
    pub fn inc_object_copied(&self) {
        self.inner.objects_copied_total.inc();
    }

    /// Count a failed top-level object and the stage it failed in.
    pub fn inc_object_failed(&self, stage: &str) {
        self.inner.objects_failed_total.inc();
        self.inner
            .stage_failures_total
            .with_label_values(&[stage])
            .inc();
    }

    /// Count a parent object copied on demand.
    pub fn inc_parent_copied(&self) {
        self.inner.parents_copied_total.inc();
    }

    /// Count a parent reference satisfied by an existing copy.
    pub fn inc_parent_reused(&self) {
        self.inner.parents_reused_total.inc();
    }

    /// Record one completed blob transfer.
    pub fn record_blob(&self, bytes: u64) {
        self.inner.blobs_transferred_total.inc();
        self.inner.bytes_transferred_total.inc_by(bytes);
    }

    /// Count a sample created in the target.
    pub fn inc_sample_copied(&self) {
        self.inner.samples_copied_total.inc();
    }

    /// Count a sample reused from the concordance.
    pub fn inc_sample_reused(&self) {
        self.inner.samples_reused_total.inc();
    }

    /// Count a data link created in the target.
    pub fn inc_link_created(&self) {
        self.inner.links_created_total.inc();
    }

    /// Count a transport retry against `service`.
    pub fn inc_transport_retry(&self, service: &str) {
        self.inner.transport_retries_total.inc();
        self.inner
            .transport_retries_by_service
            .with_label_values(&[service])
            .inc();
    }

    /// Render the registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a point-in-time snapshot of every counter.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = &self.inner;
        MetricsSnapshot {
            objects_copied: inner.objects_copied_total.get(),
            objects_failed: inner.objects_failed_total.get(),
            parents_copied: inner.parents_copied_total.get(),
            parents_reused: inner.parents_reused_total.get(),
            blobs_transferred: inner.blobs_transferred_total.get(),
            bytes_transferred: inner.bytes_transferred_total.get(),
            samples_copied: inner.samples_copied_total.get(),
            samples_reused: inner.samples_reused_total.get(),
            links_created: inner.links_created_total.get(),
            transport_retries: inner.transport_retries_total.get(),
        }
    }
}

pub(crate) fn counter(
    registry: &Registry,
    name: &'static str,
    help: &str,
) -> Result<IntCounter> {
    let collector = IntCounter::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::MetricsCollector { name, source })?;
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })?;
    Ok(collector)
}

fn counter_vec(
    registry: &Registry,
    name: &'static str,
    help: &str,
    labels: &[&str],
) -> Result<IntCounterVec> {
    let collector = IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::MetricsCollector { name, source })?;
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })?;
    Ok(collector)
}
