use csv::ReaderBuilder;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::cache::PersistentLru;
use crate::error::{ReplayError, ReplayErrorKind, ReplayWarning, ReplayWarningKind};
use crate::model::{key_text, InputFormat, OpKind, OpRecord, ScriptFile};
use crate::path::{parse_path, resolve};
use crate::validator::check_op_record;

const CSV_COLUMNS: [&str; 4] = ["op", "key", "value", "expect"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayOptions {
    /// Turn expectation mismatches into errors instead of warnings.
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub key: String,
    pub value: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayStep {
    pub index: usize,
    pub op: OpKind,
    pub key: String,
    pub hit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evicted: Option<Entry>,
    pub len: usize,
    pub next_stamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub capacity: usize,
    pub len: usize,
    pub next_stamp: u64,
    pub entries: Vec<Entry>,
}

impl Snapshot {
    pub fn of(cache: &PersistentLru<String, JsonValue>) -> Self {
        Self {
            capacity: cache.capacity(),
            len: cache.len(),
            next_stamp: cache.next_stamp(),
            entries: cache
                .iter()
                .map(|(key, value)| Entry {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayStats {
    pub puts: usize,
    pub gets: usize,
    pub peeks: usize,
    pub removes: usize,
    pub hits: usize,
    pub misses: usize,
    pub evictions: usize,
}

impl ReplayStats {
    pub fn merge(self, other: ReplayStats) -> ReplayStats {
        ReplayStats {
            puts: self.puts + other.puts,
            gets: self.gets + other.gets,
            peeks: self.peeks + other.peeks,
            removes: self.removes + other.removes,
            hits: self.hits + other.hits,
            misses: self.misses + other.misses,
            evictions: self.evictions + other.evictions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub steps: Vec<ReplayStep>,
    pub snapshot: Snapshot,
    pub stats: ReplayStats,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamItem {
    pub step: ReplayStep,
    pub warnings: Vec<ReplayWarning>,
}

pub fn replay(script: &ScriptFile, input: Option<&str>) -> Result<ReplayOutput, ReplayError> {
    replay_with_warnings(script, input, ReplayOptions::default()).map(|(output, _)| output)
}

pub fn replay_with_warnings(
    script: &ScriptFile,
    input: Option<&str>,
    options: ReplayOptions,
) -> Result<(ReplayOutput, Vec<ReplayWarning>), ReplayError> {
    let mut stream = replay_stream(script, input, options)?;
    let mut steps = Vec::new();
    let mut warnings = Vec::new();
    for item in stream.by_ref() {
        let item = item?;
        warnings.extend(item.warnings);
        steps.push(item.step);
    }

    let output = ReplayOutput {
        name: script.name.clone(),
        steps,
        snapshot: stream.snapshot(),
        stats: stream.stats(),
    };
    Ok((output, warnings))
}

/// Prepares a replay whose steps are produced lazily, one per operation.
/// Input is parsed up front, so malformed input fails here rather than
/// midway through the stream.
pub fn replay_stream(
    script: &ScriptFile,
    input: Option<&str>,
    options: ReplayOptions,
) -> Result<ReplayStream, ReplayError> {
    let cache = PersistentLru::try_with_capacity(script.cache.capacity)?;

    let mut records: Vec<(String, OpRecord)> = script
        .ops
        .iter()
        .enumerate()
        .map(|(index, record)| (format!("ops[{}]", index), record.clone()))
        .collect();

    match (&script.input, input) {
        (Some(_), Some(text)) => {
            let parsed = parse_input_records(script, text)?;
            records.extend(
                parsed
                    .into_iter()
                    .enumerate()
                    .map(|(index, record)| (format!("input[{}]", index), record)),
            );
        }
        (Some(_), None) => {
            return Err(ReplayError::new(
                ReplayErrorKind::InvalidInput,
                "input is required when the script has an input section",
            )
            .with_path("input"));
        }
        (None, Some(_)) => {
            return Err(ReplayError::new(
                ReplayErrorKind::InvalidInput,
                "input was given but the script has no input section",
            )
            .with_path("input"));
        }
        (None, None) => {}
    }

    log::debug!(
        "replaying {} operations against capacity {}",
        records.len(),
        cache.capacity()
    );

    Ok(ReplayStream {
        cache,
        records: records.into_iter(),
        options,
        stats: ReplayStats::default(),
        index: 0,
        zero_capacity_reported: false,
        failed: false,
    })
}

pub struct ReplayStream {
    cache: PersistentLru<String, JsonValue>,
    records: std::vec::IntoIter<(String, OpRecord)>,
    options: ReplayOptions,
    stats: ReplayStats,
    index: usize,
    zero_capacity_reported: bool,
    failed: bool,
}

impl ReplayStream {
    /// Cache contents after the steps consumed so far.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::of(&self.cache)
    }

    pub fn stats(&self) -> ReplayStats {
        self.stats
    }

    pub fn cache(&self) -> &PersistentLru<String, JsonValue> {
        &self.cache
    }

    fn apply(&mut self, path: &str, record: OpRecord) -> Result<StreamItem, ReplayError> {
        if let Some((_, message, field)) = check_op_record(&record).into_iter().next() {
            let path = match field {
                Some(field) => format!("{}.{}", path, field),
                None => path.to_string(),
            };
            return Err(ReplayError::new(ReplayErrorKind::InvalidOp, message).with_path(path));
        }

        let invalid = || ReplayError::new(ReplayErrorKind::InvalidOp, "invalid op").with_path(path);
        let kind = OpKind::parse(&record.op).ok_or_else(invalid)?;
        let key = record.key.as_ref().and_then(key_text).ok_or_else(invalid)?;

        let mut warnings = Vec::new();
        let hit = self.cache.contains_key(&key);
        let mut value = None;
        let mut evicted = None;

        match kind {
            OpKind::Put => {
                self.stats.puts += 1;
                if self.cache.capacity() == 0 && !self.zero_capacity_reported {
                    self.zero_capacity_reported = true;
                    warnings.push(
                        ReplayWarning::new(
                            ReplayWarningKind::ZeroCapacity,
                            "cache capacity is 0; every put is evicted immediately",
                        )
                        .with_path("cache.capacity"),
                    );
                }
                let stored = record.value.clone().unwrap_or(JsonValue::Null);
                let (next, out) = self.cache.put(key.clone(), stored);
                self.cache = next;
                if let Some((evicted_key, evicted_value)) = out {
                    self.stats.evictions += 1;
                    evicted = Some(Entry {
                        key: evicted_key,
                        value: evicted_value,
                    });
                }
            }
            OpKind::Get => {
                self.stats.gets += 1;
                if let Some((next, found)) = self.cache.get(&key) {
                    self.cache = next;
                    value = Some(found);
                }
            }
            OpKind::Peek => {
                self.stats.peeks += 1;
                value = self.cache.peek(&key).cloned();
            }
            OpKind::Remove => {
                self.stats.removes += 1;
                let (next, removed) = self.cache.remove(&key);
                self.cache = next;
                value = removed;
            }
        }

        if matches!(kind, OpKind::Get | OpKind::Peek) {
            if hit {
                self.stats.hits += 1;
            } else {
                self.stats.misses += 1;
            }
        }

        if let Some(message) = expectation_mismatch(kind, &record, value.as_ref(), evicted.as_ref())
        {
            let expect_path = format!("{}.expect", path);
            if self.options.strict {
                return Err(ReplayError::new(ReplayErrorKind::ExpectationFailed, message)
                    .with_path(expect_path));
            }
            warnings.push(
                ReplayWarning::new(ReplayWarningKind::ExpectationMismatch, message)
                    .with_path(expect_path),
            );
        }

        let step = ReplayStep {
            index: self.index,
            op: kind,
            key,
            hit,
            value,
            evicted,
            len: self.cache.len(),
            next_stamp: self.cache.next_stamp(),
        };
        log::trace!(
            "step {} {} hit={} len={}",
            step.index,
            kind.as_str(),
            hit,
            step.len
        );
        self.index += 1;
        Ok(StreamItem { step, warnings })
    }
}

impl Iterator for ReplayStream {
    type Item = Result<StreamItem, ReplayError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let (path, record) = self.records.next()?;
        let result = self.apply(&path, record);
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

fn expectation_mismatch(
    kind: OpKind,
    record: &OpRecord,
    value: Option<&JsonValue>,
    evicted: Option<&Entry>,
) -> Option<String> {
    let expect = record.expect.as_ref()?;
    match kind {
        OpKind::Put => {
            let actual = evicted.map(|entry| entry.key.as_str());
            let expected = key_text(expect);
            if actual == expected.as_deref() {
                None
            } else {
                Some(format!(
                    "expected eviction of {}, got {}",
                    describe_key(expected.as_deref()),
                    describe_key(actual)
                ))
            }
        }
        OpKind::Get | OpKind::Peek | OpKind::Remove => {
            let actual = value.unwrap_or(&JsonValue::Null);
            if actual == expect {
                None
            } else {
                Some(format!("expected {}, got {}", expect, actual))
            }
        }
    }
}

fn describe_key(key: Option<&str>) -> String {
    match key {
        Some(key) => format!("\"{}\"", key),
        None => "nothing".to_string(),
    }
}

fn parse_input_records(script: &ScriptFile, input: &str) -> Result<Vec<OpRecord>, ReplayError> {
    let format = script
        .input
        .as_ref()
        .map(|spec| spec.format)
        .unwrap_or(InputFormat::Json);
    match format {
        InputFormat::Csv => parse_csv(script, input),
        InputFormat::Json => parse_json(script, input),
    }
}

fn parse_json(script: &ScriptFile, input: &str) -> Result<Vec<OpRecord>, ReplayError> {
    let value: JsonValue = serde_json::from_str(input).map_err(|err| {
        ReplayError::new(
            ReplayErrorKind::InvalidInput,
            format!("failed to parse JSON input: {}", err),
        )
    })?;

    let records_path = script
        .input
        .as_ref()
        .and_then(|spec| spec.json.as_ref())
        .and_then(|json| json.records_path.as_deref());

    let records_value = match records_path {
        Some(path) => {
            let segments = parse_path(path).map_err(|err| {
                ReplayError::new(ReplayErrorKind::InvalidRecordsPath, err.message())
                    .with_path("input.json.records_path")
            })?;
            resolve(&value, &segments).ok_or_else(|| {
                ReplayError::new(
                    ReplayErrorKind::InvalidRecordsPath,
                    "records_path does not exist",
                )
                .with_path("input.json.records_path")
            })?
        }
        None => &value,
    };

    let items = match records_value {
        JsonValue::Array(items) => items.clone(),
        JsonValue::Object(_) => vec![records_value.clone()],
        _ => {
            return Err(ReplayError::new(
                ReplayErrorKind::InvalidInput,
                "records must be an array or object",
            ));
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value::<OpRecord>(item).map_err(|err| {
                ReplayError::new(
                    ReplayErrorKind::InvalidInput,
                    format!("invalid operation record: {}", err),
                )
                .with_path(format!("input[{}]", index))
            })
        })
        .collect()
}

fn parse_csv(script: &ScriptFile, input: &str) -> Result<Vec<OpRecord>, ReplayError> {
    let csv_spec = script
        .input
        .as_ref()
        .and_then(|spec| spec.csv.as_ref())
        .ok_or_else(|| {
            ReplayError::new(
                ReplayErrorKind::InvalidInput,
                "input.csv is required when format=csv",
            )
        })?;

    let delimiter = match csv_spec.delimiter.as_bytes() {
        [byte] => *byte,
        _ => {
            return Err(ReplayError::new(
                ReplayErrorKind::InvalidInput,
                "csv.delimiter must be a single character",
            ));
        }
    };

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(csv_spec.has_header)
        .trim(csv::Trim::All)
        .from_reader(input.as_bytes());

    let headers: Vec<String> = if csv_spec.has_header {
        reader.headers()?.iter().map(|name| name.to_string()).collect()
    } else {
        csv_spec.columns.clone().ok_or_else(|| {
            ReplayError::new(
                ReplayErrorKind::InvalidInput,
                "csv.columns is required when has_header=false",
            )
        })?
    };

    if let Some(unknown) = headers
        .iter()
        .find(|name| !CSV_COLUMNS.contains(&name.as_str()))
    {
        return Err(ReplayError::new(
            ReplayErrorKind::InvalidInput,
            format!("unknown csv column \"{}\"; expected op,key,value,expect", unknown),
        ));
    }

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row?;
        let mut fields = Map::new();
        for (name, cell) in headers.iter().zip(row.iter()) {
            if cell.is_empty() {
                continue;
            }
            let value = match name.as_str() {
                "op" | "key" => JsonValue::String(cell.to_string()),
                _ => cell_to_value(cell),
            };
            fields.insert(name.clone(), value);
        }
        let record = serde_json::from_value::<OpRecord>(JsonValue::Object(fields)).map_err(|err| {
            ReplayError::new(
                ReplayErrorKind::InvalidInput,
                format!("invalid operation row: {}", err),
            )
            .with_path(format!("input[{}]", index))
        })?;
        records.push(record);
    }

    Ok(records)
}

/// CSV cells holding JSON (numbers, booleans, null, objects, arrays or quoted
/// strings) become that JSON; anything else stays text.
fn cell_to_value(cell: &str) -> JsonValue {
    match serde_json::from_str::<JsonValue>(cell) {
        Ok(value) => value,
        Err(_) => JsonValue::String(cell.to_string()),
    }
}
