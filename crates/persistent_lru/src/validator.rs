use crate::error::{ErrorCode, ScriptError, ValidationResult};
use crate::locator::YamlLocator;
use crate::model::{key_text, InputFormat, OpKind, OpRecord, ScriptFile};
use crate::path::parse_path;

pub fn validate_script(script: &ScriptFile) -> ValidationResult {
    validate_script_with_locator(script, None)
}

pub fn validate_script_with_source(script: &ScriptFile, source: &str) -> ValidationResult {
    let locator = YamlLocator::from_source(source);
    validate_script_with_locator(script, Some(&locator))
}

fn validate_script_with_locator(
    script: &ScriptFile,
    locator: Option<&YamlLocator>,
) -> ValidationResult {
    let mut ctx = ValidationCtx::new(locator);

    validate_version(script, &mut ctx);
    validate_cache(script, &mut ctx);
    validate_input(script, &mut ctx);
    validate_ops(script, &mut ctx);

    ctx.finish()
}

fn validate_version(script: &ScriptFile, ctx: &mut ValidationCtx<'_>) {
    if script.version != 1 {
        ctx.push(ErrorCode::InvalidVersion, "version must be 1", "version");
    }
}

fn validate_cache(script: &ScriptFile, ctx: &mut ValidationCtx<'_>) {
    if script.cache.capacity < 0 {
        ctx.push(
            ErrorCode::InvalidCapacity,
            "cache.capacity must be >= 0",
            "cache.capacity",
        );
    }
}

fn validate_input(script: &ScriptFile, ctx: &mut ValidationCtx<'_>) {
    let Some(input) = &script.input else {
        if script.ops.is_empty() {
            ctx.push(
                ErrorCode::MissingOps,
                "script must define ops or an input section",
                "ops",
            );
        }
        return;
    };

    match input.format {
        InputFormat::Csv => {
            if input.csv.is_none() {
                ctx.push(
                    ErrorCode::MissingCsvSection,
                    "input.csv is required when format=csv",
                    "input.csv",
                );
            }
        }
        InputFormat::Json => {
            if input.json.is_none() {
                ctx.push(
                    ErrorCode::MissingJsonSection,
                    "input.json is required when format=json",
                    "input.json",
                );
            }
        }
    }

    if let Some(csv) = &input.csv {
        if csv.delimiter.chars().count() != 1 {
            ctx.push(
                ErrorCode::InvalidDelimiterLength,
                "csv.delimiter must be a single character",
                "input.csv.delimiter",
            );
        }
        if !csv.has_header && csv.columns.as_ref().is_none_or(|columns| columns.is_empty()) {
            ctx.push(
                ErrorCode::MissingCsvColumns,
                "csv.columns is required when has_header=false",
                "input.csv.columns",
            );
        }
    }

    if let Some(path) = input.json.as_ref().and_then(|json| json.records_path.as_deref()) {
        if let Err(err) = parse_path(path) {
            ctx.push(
                ErrorCode::InvalidPath,
                err.message(),
                "input.json.records_path",
            );
        }
    }
}

fn validate_ops(script: &ScriptFile, ctx: &mut ValidationCtx<'_>) {
    for (index, record) in script.ops.iter().enumerate() {
        for (code, message, field) in check_op_record(record) {
            let path = match field {
                Some(field) => format!("ops[{}].{}", index, field),
                None => format!("ops[{}]", index),
            };
            ctx.push(code, message, path);
        }
    }
}

/// Problems with a single operation record, each paired with the field it
/// concerns. Shared with the replay engine, which applies the same rules to
/// records read from input.
pub(crate) fn check_op_record(
    record: &OpRecord,
) -> Vec<(ErrorCode, &'static str, Option<&'static str>)> {
    let mut problems = Vec::new();

    let Some(kind) = OpKind::parse(&record.op) else {
        problems.push((
            ErrorCode::UnknownOp,
            "op must be put|get|peek|remove",
            Some("op"),
        ));
        return problems;
    };

    match &record.key {
        None => problems.push((ErrorCode::MissingKey, "key is required", None)),
        Some(key) => {
            if key_text(key).is_none() {
                problems.push((
                    ErrorCode::InvalidKey,
                    "key must be a string, number or bool",
                    Some("key"),
                ));
            }
        }
    }

    match (kind, &record.value) {
        (OpKind::Put, None) => {
            problems.push((ErrorCode::MissingValue, "put requires a value", None));
        }
        (OpKind::Get | OpKind::Peek | OpKind::Remove, Some(_)) => {
            problems.push((
                ErrorCode::UnexpectedValue,
                "value is only allowed on put",
                Some("value"),
            ));
        }
        _ => {}
    }

    if kind == OpKind::Put {
        if let Some(expect) = &record.expect {
            if !expect.is_null() && key_text(expect).is_none() {
                problems.push((
                    ErrorCode::InvalidKey,
                    "put expect must name the evicted key or be null",
                    Some("expect"),
                ));
            }
        }
    }

    problems
}

struct ValidationCtx<'a> {
    locator: Option<&'a YamlLocator>,
    errors: Vec<ScriptError>,
}

impl<'a> ValidationCtx<'a> {
    fn new(locator: Option<&'a YamlLocator>) -> Self {
        Self {
            locator,
            errors: Vec::new(),
        }
    }

    fn push(&mut self, code: ErrorCode, message: &str, path: impl Into<String>) {
        let path = path.into();
        let mut err = ScriptError::new(code, message).with_path(path.clone());
        if let Some(location) = self.locator.and_then(|locator| locator.nearest(&path)) {
            err = err.with_location(location.line, location.column);
        }
        self.errors.push(err);
    }

    fn finish(self) -> ValidationResult {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}
