// src/collector/verbs.rs
//! RDMA verbs status from `mmfsadm test verbs status`.

use prometheus::core::{Collector as _, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{IntGauge, Opts};

use super::Source;
use crate::error::ParseError;
use crate::runner::Invocation;

const MMFSADM: &str = "/usr/lpp/mmfs/bin/mmfsadm";
const STATUS_LABEL: &str = "VERBS RDMA status";
const ACTIVE: &str = "started";

/// Raw verbs status token, e.g. `started` or `disabled`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatus {
    pub status: String,
}

impl LinkStatus {
    pub fn is_active(&self) -> bool {
        self.status == ACTIVE
    }
}

/// Function to extract the verbs status from `mmfsadm` output.
pub fn parse_verbs(output: &str) -> Result<LinkStatus, ParseError> {
    for (index, line) in output.lines().enumerate() {
        let Some(start) = line.find(STATUS_LABEL) else {
            continue;
        };
        let Some(rest) = line[start + STATUS_LABEL.len()..].trim_start().strip_prefix(':') else {
            continue;
        };
        let status = rest.trim();
        if status.is_empty() {
            return Err(ParseError::EmptyStatus { line: index + 1 });
        }
        return Ok(LinkStatus {
            status: status.to_string(),
        });
    }

    Err(ParseError::LabelNotFound {
        label: STATUS_LABEL,
    })
}

/// `mmfsadm test verbs status` source.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerbsSource;

fn status_gauge() -> prometheus::Result<IntGauge> {
    IntGauge::with_opts(Opts::new(
        "gpfs_verbs_status",
        "GPFS verbs status, 1=started 0=not started",
    ))
}

impl Source for VerbsSource {
    type Payload = LinkStatus;

    fn name(&self) -> &'static str {
        "verbs"
    }

    fn invocation(&self) -> Invocation {
        Invocation::new(MMFSADM, &["test", "verbs", "status"])
    }

    fn parse(&self, output: &str) -> Result<Self::Payload, ParseError> {
        parse_verbs(output)
    }

    fn describe(&self) -> prometheus::Result<Vec<Desc>> {
        Ok(status_gauge()?.desc().into_iter().cloned().collect())
    }

    fn families(&self, payload: &Self::Payload) -> prometheus::Result<Vec<MetricFamily>> {
        let gauge = status_gauge()?;
        gauge.set(i64::from(payload.is_active()));
        Ok(gauge.collect())
    }
}
