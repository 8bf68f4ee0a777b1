use crate::{Db, Error, Field, Status};
use log::{info, warn};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use statrs::statistics::OrderStatistics;
use std::collections::BTreeMap;
use std::time::Instant;

/// Parameters of a core workload, in the usual YCSB vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadSpec {
    pub name: String,
    pub table: String,
    pub record_count: usize,
    pub operation_count: usize,
    pub field_count: usize,
    pub field_length: usize,
    pub read_all_fields: bool,
    pub read_proportion: f64,
    pub update_proportion: f64,
    pub insert_proportion: f64,
    pub scan_proportion: f64,
    pub delete_proportion: f64,
    pub max_scan_length: usize,
}

impl Default for WorkloadSpec {
    fn default() -> Self {
        WorkloadSpec {
            name: "workloada".to_string(),
            table: "usertable".to_string(),
            record_count: 1000,
            operation_count: 1000,
            field_count: 10,
            field_length: 100,
            read_all_fields: true,
            read_proportion: 0.5,
            update_proportion: 0.5,
            insert_proportion: 0.0,
            scan_proportion: 0.0,
            delete_proportion: 0.0,
            max_scan_length: 100,
        }
    }
}

impl WorkloadSpec {
    pub fn validate(&self) -> Result<(), Error> {
        let total = self.read_proportion
            + self.update_proportion
            + self.insert_proportion
            + self.scan_proportion
            + self.delete_proportion;
        if (total - 1.0).abs() > 1e-6 {
            return Err(Error::Config(format!(
                "operation proportions sum to {}, expected 1",
                total
            )));
        }
        if self.field_count == 0 {
            return Err(Error::Config("field_count must be positive".to_string()));
        }
        if self.scan_proportion > 0.0 && self.max_scan_length == 0 {
            return Err(Error::Config(
                "max_scan_length must be positive when scans are enabled".to_string(),
            ));
        }
        Ok(())
    }

    fn field_name(i: usize) -> String {
        format!("field{}", i)
    }

    fn field_names(&self) -> Vec<String> {
        (0..self.field_count).map(Self::field_name).collect()
    }

    /// Map `val` in `[0, 1)` onto an operation by cumulative proportion.
    fn choose(&self, val: f64) -> TaskType {
        let mut bar = self.read_proportion;
        if val < bar {
            return TaskType::Read;
        }

        bar += self.update_proportion;
        if val < bar {
            return TaskType::Update;
        }

        bar += self.insert_proportion;
        if val < bar {
            return TaskType::Insert;
        }

        bar += self.scan_proportion;
        if val < bar {
            return TaskType::Scan;
        }

        TaskType::Delete
    }

    fn choose_fields<R: Rng>(&self, rng: &mut R) -> Option<Vec<String>> {
        if self.read_all_fields {
            None
        } else {
            Some(vec![Self::field_name(rng.gen_range(0, self.field_count))])
        }
    }
}

/// The load phase: one insert per record, keyed `0..record_count`.
pub fn generate_load(spec: &WorkloadSpec) -> Workload {
    Workload {
        name: spec.name.clone(),
        table: spec.table.clone(),
        tasks: (0..spec.record_count)
            .map(|id| Task::Insert(id.to_string(), spec.field_count, spec.field_length))
            .collect(),
    }
}

/// The run phase: `operation_count` operations drawn by proportion.
///
/// Keys stay in the dense numeric sequence the scans rely on; inserts
/// extend it past `record_count`.
pub fn generate_run(spec: &WorkloadSpec) -> Workload {
    let mut rng = thread_rng();
    let mut key_count = spec.record_count;
    let mut tasks = Vec::with_capacity(spec.operation_count);
    for _ in 0..spec.operation_count {
        let task = match spec.choose(rng.gen::<f64>()) {
            TaskType::Read => Task::Read(
                existing_key(&mut rng, key_count),
                spec.choose_fields(&mut rng),
            ),
            TaskType::Update => {
                let fields = match spec.choose_fields(&mut rng) {
                    Some(one) => one,
                    None => spec.field_names(),
                };
                Task::Update(existing_key(&mut rng, key_count), fields, spec.field_length)
            }
            TaskType::Insert => {
                let key = key_count.to_string();
                key_count += 1;
                Task::Insert(key, spec.field_count, spec.field_length)
            }
            TaskType::Scan => {
                let len = rng.gen_range(1, spec.max_scan_length.max(1) + 1);
                Task::Scan(
                    existing_key(&mut rng, key_count),
                    len,
                    spec.choose_fields(&mut rng),
                )
            }
            TaskType::Delete => Task::Delete(existing_key(&mut rng, key_count)),
        };
        tasks.push(task);
    }
    Workload {
        name: spec.name.clone(),
        table: spec.table.clone(),
        tasks,
    }
}

fn existing_key<R: Rng>(rng: &mut R, key_count: usize) -> String {
    if key_count == 0 {
        return "0".to_string();
    }
    rng.gen_range(0, key_count).to_string()
}

/// Execute every task in order. Failed operations are counted, never fatal.
pub fn run_workload(workload: &Workload, db: &mut dyn Db) -> WorkloadResult {
    let mut rng = thread_rng();
    let table = workload.table.as_str();
    info!(
        "running {} tasks of {} on table {}",
        workload.tasks.len(),
        workload.name,
        table
    );
    let results = workload
        .tasks
        .iter()
        .map(|task| {
            let (task_type, status, elapsed) = match task {
                Task::Read(key, fields) => {
                    let now = Instant::now();
                    let result = db.read(table, key, fields.as_deref());
                    (TaskType::Read, check(&result), now.elapsed().as_nanos())
                }
                Task::Scan(key, len, fields) => {
                    let now = Instant::now();
                    let result = db.scan(table, key, *len, fields.as_deref());
                    (TaskType::Scan, check(&result), now.elapsed().as_nanos())
                }
                Task::Update(key, names, field_length) => {
                    let values: Vec<Field> = names
                        .iter()
                        .map(|name| Field::new(name.as_str(), rand_string(&mut rng, *field_length)))
                        .collect();
                    let now = Instant::now();
                    let result = db.update(table, key, &values);
                    (TaskType::Update, check(&result), now.elapsed().as_nanos())
                }
                Task::Insert(key, field_count, field_length) => {
                    let values: Vec<Field> = (0..*field_count)
                        .map(|i| {
                            Field::new(
                                WorkloadSpec::field_name(i),
                                rand_string(&mut rng, *field_length),
                            )
                        })
                        .collect();
                    let now = Instant::now();
                    let result = db.insert(table, key, &values);
                    (TaskType::Insert, check(&result), now.elapsed().as_nanos())
                }
                Task::Delete(key) => {
                    let now = Instant::now();
                    let result = db.delete(table, key);
                    (TaskType::Delete, check(&result), now.elapsed().as_nanos())
                }
            };
            TaskResult(task_type, status, elapsed)
        })
        .collect();
    WorkloadResult {
        name: workload.name.clone(),
        results,
    }
}

fn check<T>(result: &Result<T, Error>) -> Status {
    let status = Status::of(result);
    if let Err(e) = result {
        if status == Status::Error {
            warn!("operation failed: {}", e);
        }
    }
    status
}

pub fn generate_report(result: &WorkloadResult) -> WorkloadReport {
    let mut latencies: BTreeMap<TaskType, Vec<f64>> = BTreeMap::new();
    let mut statuses: BTreeMap<TaskType, BTreeMap<Status, usize>> = BTreeMap::new();
    for tr in &result.results {
        latencies
            .entry(tr.0)
            .or_insert_with(Vec::new)
            .push((tr.2 as f64) / 1000.0);
        *statuses
            .entry(tr.0)
            .or_insert_with(BTreeMap::new)
            .entry(tr.1)
            .or_insert(0) += 1;
    }

    let mut total_us = 0.0;
    let tasks = latencies
        .into_iter()
        .map(|(task_type, mut data)| {
            let data = &mut data[..];
            let total: f64 = data.iter().sum();
            total_us += total;
            let report = TaskReport {
                count: data.len(),
                statuses: statuses.remove(&task_type).unwrap_or_default(),
                total,
                median: data.median(),
                lower_quartile: data.lower_quartile(),
                upper_quartile: data.upper_quartile(),
                p99: data.percentile(99),
            };
            (task_type, report)
        })
        .collect();

    let operations = result.results.len();
    let throughput = if total_us > 0.0 {
        operations as f64 / (total_us / 1_000_000.0)
    } else {
        0.0
    };
    WorkloadReport {
        workload: result.name.clone(),
        operations,
        throughput,
        tasks,
    }
}

/// Median throughput of every workload across repeated runs.
pub fn summarize(reports: &[WorkloadReport]) -> Vec<ThroughputSummary> {
    let mut grouped: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for report in reports {
        grouped
            .entry(report.workload.as_str())
            .or_insert_with(Vec::new)
            .push(report.throughput);
    }
    grouped
        .into_iter()
        .map(|(workload, mut data)| ThroughputSummary {
            workload: workload.to_string(),
            runs: data.len(),
            median_throughput: (&mut data[..]).median(),
        })
        .collect()
}

fn rand_string<R: Rng>(rng: &mut R, len: usize) -> String {
    (0..len).map(|_| rng.sample(Alphanumeric)).collect()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Workload {
    pub name: String,
    pub table: String,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    // key, fields
    Read(String, Option<Vec<String>>),
    // start key, count, fields
    Scan(String, usize, Option<Vec<String>>),
    // key, field names, field_length
    Update(String, Vec<String>, usize),
    // key, field_count, field_length
    Insert(String, usize, usize),
    Delete(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkloadResult {
    pub name: String,
    pub results: Vec<TaskResult>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskResult(pub TaskType, pub Status, pub u128);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Read,
    Scan,
    Update,
    Insert,
    Delete,
}

/// Latencies are in microseconds.
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskReport {
    pub count: usize,
    pub statuses: BTreeMap<Status, usize>,
    pub total: f64,
    pub median: f64,
    pub lower_quartile: f64,
    pub upper_quartile: f64,
    pub p99: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkloadReport {
    pub workload: String,
    pub operations: usize,
    /// Operations per second of summed operation latency.
    pub throughput: f64,
    pub tasks: BTreeMap<TaskType, TaskReport>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThroughputSummary {
    pub workload: String,
    pub runs: usize,
    pub median_throughput: f64,
}
