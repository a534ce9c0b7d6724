use crate::domain::CollectorError;

pub mod stat_user_tables_size;

pub const NAMESPACE: &str = "pg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Gauge,
}

/// Static description of a metric family. Built once and shared by every
/// sample of that family.
#[derive(Debug, PartialEq, Eq)]
pub struct MetricDescriptor {
    fq_name: String,
    help: &'static str,
    label_names: &'static [&'static str],
    kind: ValueKind,
}

impl MetricDescriptor {
    pub fn gauge(
        fq_name: impl Into<String>,
        help: &'static str,
        label_names: &'static [&'static str],
    ) -> Self {
        Self {
            fq_name: fq_name.into(),
            help,
            label_names,
            kind: ValueKind::Gauge,
        }
    }

    pub fn fq_name(&self) -> &str {
        &self.fq_name
    }

    pub fn help(&self) -> &'static str {
        self.help
    }

    pub fn label_names(&self) -> &'static [&'static str] {
        self.label_names
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }
}

/// A single labeled value of a metric family.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    descriptor: &'static MetricDescriptor,
    label_values: Vec<String>,
    value: f64,
}

impl MetricSample {
    /// Label values must be given in the order of the descriptor's label names.
    pub fn new(
        descriptor: &'static MetricDescriptor,
        value: f64,
        label_values: Vec<String>,
    ) -> Result<Self, CollectorError> {
        if label_values.len() != descriptor.label_names.len() {
            return Err(CollectorError::InvalidSample {
                name: descriptor.fq_name.clone(),
                expected: descriptor.label_names.len(),
                actual: label_values.len(),
            });
        }

        Ok(Self {
            descriptor,
            label_values,
            value,
        })
    }

    pub fn descriptor(&self) -> &'static MetricDescriptor {
        self.descriptor
    }

    pub fn label_values(&self) -> &[String] {
        &self.label_values
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Joins the non-empty parts with `_`, e.g. `pg_stat_user_tables_size_bytes`.
pub fn build_fq_name(namespace: &str, subsystem: &str, name: &str) -> String {
    [namespace, subsystem, name]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}
