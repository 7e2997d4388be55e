//! Prometheus metrics for partition execution.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::Arc;

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct OutcomeLabel(pub &'static str);

impl prometheus_client::encoding::EncodeLabelSet for OutcomeLabel {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("outcome", self.0).encode(encoder.encode_label())?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct ScanMetrics {
    pub active_units: Gauge,
    pub units_finished: Family<OutcomeLabel, Counter>,
    pub unit_retries: Counter,
    pub documents_fetched: Counter,
    pub registry: Arc<Registry>,
}

/// Lowers `active_units` on drop, also when the unit panics or is aborted.
pub(crate) struct ActiveUnit<'a>(&'a Gauge);

impl Drop for ActiveUnit<'_> {
    fn drop(&mut self) {
        self.0.dec();
    }
}

impl Default for ScanMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let active_units = Gauge::default();
        registry.register(
            "escan_active_units",
            "Number of partition units currently executing",
            active_units.clone(),
        );

        let units_finished = Family::<OutcomeLabel, Counter>::default();
        registry.register(
            "escan_units_finished",
            "Partition units finished, by outcome",
            units_finished.clone(),
        );

        let unit_retries = Counter::default();
        registry.register(
            "escan_unit_retries",
            "Partition units re-executed after a failure",
            unit_retries.clone(),
        );

        let documents_fetched = Counter::default();
        registry.register(
            "escan_documents_fetched",
            "Documents returned by completed partition units",
            documents_fetched.clone(),
        );

        Self {
            active_units,
            units_finished,
            unit_retries,
            documents_fetched,
            registry: Arc::new(registry),
        }
    }

    /// Raise `active_units` until the returned guard is dropped.
    pub(crate) fn track_active(&self) -> ActiveUnit<'_> {
        self.active_units.inc();
        ActiveUnit(&self.active_units)
    }

    pub(crate) fn record_success(&self, documents: usize) {
        self.units_finished.get_or_create(&OutcomeLabel("ok")).inc();
        self.documents_fetched.inc_by(documents as u64);
    }

    pub(crate) fn record_failure(&self) {
        self.units_finished
            .get_or_create(&OutcomeLabel("failed"))
            .inc();
    }

    pub fn completed(&self) -> u64 {
        self.units_finished.get_or_create(&OutcomeLabel("ok")).get()
    }

    pub fn failed(&self) -> u64 {
        self.units_finished
            .get_or_create(&OutcomeLabel("failed"))
            .get()
    }

    /// Encode all metrics as Prometheus text format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buf = String::new();
        encode(&mut buf, &self.registry)?;
        Ok(buf)
    }
}
