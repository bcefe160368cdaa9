// src/collector/mmpmon.rs
//! Per-filesystem I/O counters from `mmpmon` `fs_io_s` requests.

use prometheus::core::{Collector as _, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{IntCounterVec, Opts};

use super::Source;
use crate::error::ParseError;
use crate::runner::Invocation;

const MMPMON: &str = "/usr/lpp/mmfs/bin/mmpmon";
const SENTINEL: &str = "_fs_io_s_";

/// Operation counters reported per filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Opens,
    Closes,
    Reads,
    Writes,
    ReadDir,
    InodeUpdates,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::Opens,
        Operation::Closes,
        Operation::Reads,
        Operation::Writes,
        Operation::ReadDir,
        Operation::InodeUpdates,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Opens => "opens",
            Operation::Closes => "closes",
            Operation::Reads => "reads",
            Operation::Writes => "writes",
            Operation::ReadDir => "read_dir",
            Operation::InodeUpdates => "inode_updates",
        }
    }
}

/// One `_fs_io_s_` line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerformanceRecord {
    /// Node address (`_n_`).
    pub node_address: String,
    /// Node name (`_nn_`).
    pub node_name: String,
    /// Filesystem name (`_fs_`).
    pub filesystem: String,
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub opens: u64,
    pub closes: u64,
    pub reads: u64,
    pub writes: u64,
    pub read_dir: u64,
    pub inode_updates: u64,
}

impl PerformanceRecord {
    pub fn operation(&self, op: Operation) -> u64 {
        match op {
            Operation::Opens => self.opens,
            Operation::Closes => self.closes,
            Operation::Reads => self.reads,
            Operation::Writes => self.writes,
            Operation::ReadDir => self.read_dir,
            Operation::InodeUpdates => self.inode_updates,
        }
    }

    pub fn operations(&self) -> impl Iterator<Item = (Operation, u64)> + '_ {
        Operation::ALL.into_iter().map(|op| (op, self.operation(op)))
    }
}

enum Field {
    Text(fn(&mut PerformanceRecord) -> &mut String),
    Number(fn(&mut PerformanceRecord) -> &mut u64),
}

fn lookup_field(tag: &str) -> Option<(&'static str, Field)> {
    let mapped = match tag {
        "_n_" => ("_n_", Field::Text(|r| &mut r.node_address)),
        "_nn_" => ("_nn_", Field::Text(|r| &mut r.node_name)),
        "_fs_" => ("_fs_", Field::Text(|r| &mut r.filesystem)),
        "_br_" => ("_br_", Field::Number(|r| &mut r.read_bytes)),
        "_bw_" => ("_bw_", Field::Number(|r| &mut r.write_bytes)),
        "_oc_" => ("_oc_", Field::Number(|r| &mut r.opens)),
        "_cc_" => ("_cc_", Field::Number(|r| &mut r.closes)),
        "_rdc_" => ("_rdc_", Field::Number(|r| &mut r.reads)),
        "_wc_" => ("_wc_", Field::Number(|r| &mut r.writes)),
        "_dir_" => ("_dir_", Field::Number(|r| &mut r.read_dir)),
        "_iu_" => ("_iu_", Field::Number(|r| &mut r.inode_updates)),
        _ => return None,
    };
    Some(mapped)
}

/// Function to parse `mmpmon -p` output into one record per `_fs_io_s_` line.
///
/// Any malformed numeric field fails the whole call.
pub fn parse_mmpmon(output: &str) -> Result<Vec<PerformanceRecord>, ParseError> {
    let mut records = Vec::new();

    for (index, line) in output.lines().enumerate() {
        let mut tokens = line.split_whitespace();
        if tokens.next() != Some(SENTINEL) {
            continue;
        }
        let line_no = index + 1;
        let mut record = PerformanceRecord::default();

        while let Some(tag) = tokens.next() {
            let value = tokens.next();
            let Some((tag, field)) = lookup_field(tag) else {
                continue;
            };
            let value = value.ok_or(ParseError::MissingValue { line: line_no, tag })?;
            match field {
                Field::Text(slot) => *slot(&mut record) = value.to_string(),
                Field::Number(slot) => {
                    *slot(&mut record) = value.parse().map_err(|_| ParseError::InvalidNumber {
                        line: line_no,
                        tag,
                        value: value.to_string(),
                    })?;
                }
            }
        }

        records.push(record);
    }

    Ok(records)
}

/// `mmpmon fs_io_s` source.
#[derive(Debug, Clone, Copy, Default)]
pub struct MmpmonSource;

struct PerfMetrics {
    operations: IntCounterVec,
    read_bytes: IntCounterVec,
    write_bytes: IntCounterVec,
}

impl PerfMetrics {
    fn new() -> prometheus::Result<Self> {
        Ok(Self {
            operations: IntCounterVec::new(
                Opts::new("gpfs_perf_operations", "GPFS operations reported by mmpmon"),
                &["fs", "nodename", "operation"],
            )?,
            read_bytes: IntCounterVec::new(
                Opts::new("gpfs_perf_read_bytes", "GPFS read bytes"),
                &["fs", "nodename"],
            )?,
            write_bytes: IntCounterVec::new(
                Opts::new("gpfs_perf_write_bytes", "GPFS write bytes"),
                &["fs", "nodename"],
            )?,
        })
    }

    fn record(&self, perf: &PerformanceRecord) {
        let (fs, node) = (perf.filesystem.as_str(), perf.node_name.as_str());
        // A repeated (node, fs) row replaces the earlier one.
        for (op, count) in perf.operations() {
            let counter = self.operations.with_label_values(&[fs, node, op.as_str()]);
            counter.reset();
            counter.inc_by(count);
        }
        let read = self.read_bytes.with_label_values(&[fs, node]);
        read.reset();
        read.inc_by(perf.read_bytes);
        let write = self.write_bytes.with_label_values(&[fs, node]);
        write.reset();
        write.inc_by(perf.write_bytes);
    }
}

impl Source for MmpmonSource {
    type Payload = Vec<PerformanceRecord>;

    fn name(&self) -> &'static str {
        "mmpmon"
    }

    fn invocation(&self) -> Invocation {
        Invocation::new(MMPMON, &["-s", "-p"]).with_stdin("fs_io_s\n")
    }

    fn parse(&self, output: &str) -> Result<Self::Payload, ParseError> {
        parse_mmpmon(output)
    }

    fn describe(&self) -> prometheus::Result<Vec<Desc>> {
        let metrics = PerfMetrics::new()?;
        Ok(metrics
            .operations
            .desc()
            .into_iter()
            .chain(metrics.read_bytes.desc())
            .chain(metrics.write_bytes.desc())
            .cloned()
            .collect())
    }

    fn families(&self, payload: &Self::Payload) -> prometheus::Result<Vec<MetricFamily>> {
        let metrics = PerfMetrics::new()?;
        for perf in payload {
            metrics.record(perf);
        }
        let mut families = metrics.operations.collect();
        families.extend(metrics.read_bytes.collect());
        families.extend(metrics.write_bytes.collect());
        Ok(families)
    }
}
