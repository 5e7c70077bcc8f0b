//! Sample link propagation from source objects to their target copies.
//!
//! # Design
//! - Each link moves from discovered, to a resolved target sample (reused
//!   from the concordance or freshly copied), to linked.
//! - Every link of an object is checked for version 1 before anything is
//!   created, so an unsupported version never leaves half-linked objects.
//! - A created sample is written to the concordance before its link is made.

use std::time::Instant;

use tracing::{debug, info, warn};
use wscopy_core::{DataLink, Environment, ListQuery, NewDataLink, ObjectRef, SampleVersion};
use wscopy_telemetry::Metrics;

use crate::concordance::{Concordance, ConcordanceEntry};
use crate::error::{MigrateError, MigrateResult, Stage, StageExt};
use crate::planner::check_limit;

const SUPPORTED_SAMPLE_VERSION: u64 = 1;
const SAMPLE_ID_FIELD: &str = "id";

/// Inputs to a link propagation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSettings {
    /// Target container holding the copies.
    pub target_container: u64,
    /// Bare type name of the copies to visit.
    pub type_name: String,
    /// Listing size treated as truncated.
    pub listing_limit: usize,
}

/// Outcome of a link propagation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSummary {
    /// Target objects whose links were propagated.
    pub objects: usize,
    /// Samples created in the target.
    pub samples_copied: usize,
    /// Samples resolved through the concordance.
    pub samples_reused: usize,
    /// Links created in the target.
    pub links_created: usize,
    /// Links already present in the target.
    pub links_existing: usize,
    /// Target objects skipped for lacking a usable marker.
    pub skipped: usize,
}

/// Replicates sample links from source objects onto their target copies.
pub struct SampleLinker {
    source: Environment,
    target: Environment,
    settings: LinkSettings,
    metrics: Option<Metrics>,
}

impl SampleLinker {
    /// Build a linker.
    #[must_use]
    pub const fn new(source: Environment, target: Environment, settings: LinkSettings) -> Self {
        Self {
            source,
            target,
            settings,
            metrics: None,
        }
    }

    /// Record progress counters into `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Visit every copied object of the active type in the target container
    /// and propagate the links of its source object.
    ///
    /// # Errors
    ///
    /// Stops at the first failure: `ScaleLimit`, `UnsupportedSampleVersion`,
    /// concordance IO, or a service error, attributed to the target object.
    pub async fn run(&self, concordance: &mut Concordance) -> MigrateResult<LinkSummary> {
        let started = Instant::now();
        let query = ListQuery::container(self.settings.target_container)
            .of_type(self.settings.type_name.clone())
            .with_metadata();
        let copies = self
            .target
            .workspace
            .list_objects(&query)
            .await
            .map_err(|error| MigrateError::service("list_target_objects", error))?;
        check_limit(
            self.settings.target_container,
            copies.len(),
            self.settings.listing_limit,
        )?;

        let mut summary = LinkSummary::default();
        let total = copies.len();
        for (index, copy) in copies.iter().enumerate() {
            let source = match copy.marker() {
                Ok(Some(marker)) if marker.is_from(self.source.identity()) => marker.source,
                Ok(Some(marker)) => {
                    warn!(object = %copy.reference, source_url = %marker.source_url, "copy came from another source; skipping");
                    summary.skipped += 1;
                    continue;
                }
                Ok(None) => {
                    warn!(object = %copy.reference, "object carries no copy marker; skipping");
                    summary.skipped += 1;
                    continue;
                }
                Err(error) => {
                    warn!(object = %copy.reference, error = %error, "unreadable copy marker; skipping");
                    summary.skipped += 1;
                    continue;
                }
            };
            self.propagate_object(concordance, source, copy.reference, &mut summary)
                .await
                .at(copy.reference, Stage::Link)?;
            summary.objects += 1;
            debug!(
                object = %copy.reference,
                source = %source,
                progress = %format!("{}/{total}", index + 1),
                "links propagated"
            );
        }

        info!(
            objects = summary.objects,
            samples_copied = summary.samples_copied,
            samples_reused = summary.samples_reused,
            links_created = summary.links_created,
            links_existing = summary.links_existing,
            skipped = summary.skipped,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "sample link propagation finished"
        );
        Ok(summary)
    }

    /// Propagate every link of `source` onto `target`.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedSampleVersion` before any mutation when a link is
    /// not at version 1; otherwise the first service or concordance failure.
    pub async fn propagate_object(
        &self,
        concordance: &mut Concordance,
        source: ObjectRef,
        target: ObjectRef,
        summary: &mut LinkSummary,
    ) -> MigrateResult<()> {
        let links = self
            .source
            .samples
            .data_links(source)
            .await
            .map_err(|error| MigrateError::service("get_source_links", error))?;
        if links.is_empty() {
            return Ok(());
        }
        if let Some(link) = links
            .iter()
            .find(|link| link.version != SUPPORTED_SAMPLE_VERSION)
        {
            return Err(MigrateError::UnsupportedSampleVersion {
                sample_id: link.sample_id.clone(),
                version: link.version,
                object: source,
            });
        }

        let existing = self
            .target
            .samples
            .data_links(target)
            .await
            .map_err(|error| MigrateError::service("get_target_links", error))?;

        for link in links {
            let target_sample = self
                .resolve_sample(concordance, source, &link, summary)
                .await?;
            if existing
                .iter()
                .any(|present| same_link(present, &link, &target_sample))
            {
                debug!(object = %target, sample = %target_sample, node = %link.node, "link already present");
                summary.links_existing += 1;
                continue;
            }

            let created = self
                .target
                .samples
                .create_data_link(NewDataLink {
                    upa: target,
                    dataid: link.dataid.clone(),
                    sample: target_sample,
                    node: link.node.clone(),
                })
                .await
                .map_err(|error| MigrateError::service("create_data_link", error))?;
            if let Some(metrics) = &self.metrics {
                metrics.inc_link_created();
            }
            summary.links_created += 1;
            info!(
                object = %target,
                sample = %created.sample(),
                node = %created.node,
                "data link created"
            );
        }
        Ok(())
    }

    async fn resolve_sample(
        &self,
        concordance: &mut Concordance,
        source: ObjectRef,
        link: &DataLink,
        summary: &mut LinkSummary,
    ) -> MigrateResult<SampleVersion> {
        let source_sample = link.sample();
        if let Some(known) = concordance.get(&source_sample) {
            debug!(sample = %source_sample, target = %known, "sample found in concordance");
            if let Some(metrics) = &self.metrics {
                metrics.inc_sample_reused();
            }
            summary.samples_reused += 1;
            return Ok(known.clone());
        }

        let mut record = self
            .source
            .samples
            .sample_via_data(source, &source_sample)
            .await
            .map_err(|error| MigrateError::service("get_sample_via_data", error))?;
        record.remove(SAMPLE_ID_FIELD);
        let created = self
            .target
            .samples
            .create_sample(record)
            .await
            .map_err(|error| MigrateError::service("create_sample", error))?;
        concordance
            .record(ConcordanceEntry {
                source: source_sample.clone(),
                target: created.clone(),
            })
            .await?;
        if let Some(metrics) = &self.metrics {
            metrics.inc_sample_copied();
        }
        summary.samples_copied += 1;
        info!(sample = %source_sample, target = %created, "sample copied");
        Ok(created)
    }
}

fn same_link(present: &DataLink, wanted: &DataLink, target_sample: &SampleVersion) -> bool {
    present.node == wanted.node
        && present.dataid == wanted.dataid
        && present.sample_id == target_sample.id
        && present.version == target_sample.version
}
