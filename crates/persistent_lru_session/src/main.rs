use std::io::{self, BufRead, BufReader, Write};

use persistent_lru::{key_text, CacheHistory, PersistentLru, Snapshot};
use serde_json::{json, Map, Value};

const SERVER_NAME: &str = "lru-session";
const NO_CACHE: i32 = -32002;
const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;
const METHODS: [&str; 11] = [
    "initialize",
    "ping",
    "shutdown",
    "cache/create",
    "cache/put",
    "cache/get",
    "cache/peek",
    "cache/remove",
    "cache/snapshot",
    "cache/checkout",
    "cache/history",
];

type Cache = PersistentLru<String, Value>;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    if let Err(err) = run() {
        log::error!("fatal: {}", err);
        std::process::exit(1);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OutputMode {
    Line,
    ContentLength,
}

fn run() -> Result<(), String> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut reader = BufReader::new(stdin.lock());
    let mut writer = io::BufWriter::new(stdout.lock());
    let mut output_mode = OutputMode::Line;
    let mut session = Session::default();

    loop {
        let message = match read_message(&mut reader, &mut output_mode) {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(err) => return Err(err.to_string()),
        };

        let value: Value = match serde_json::from_str(&message) {
            Ok(value) => value,
            Err(err) => {
                log::warn!("invalid json: {}", err);
                let response = error_response(Value::Null, -32700, "Parse error");
                write_message(&mut writer, output_mode, &response)
                    .map_err(|err| err.to_string())?;
                continue;
            }
        };

        if let Some(response) = session.handle_message(value) {
            write_message(&mut writer, output_mode, &response)
                .map_err(|err| err.to_string())?;
        }
    }

    Ok(())
}

fn read_message(
    reader: &mut impl BufRead,
    output_mode: &mut OutputMode,
) -> io::Result<Option<String>> {
    let mut line = String::new();
    loop {
        line.clear();
        let bytes = reader.read_line(&mut line)?;
        if bytes == 0 {
            return Ok(None);
        }

        if let Some(length) = line.strip_prefix("Content-Length:") {
            let length = length.trim().parse::<usize>().map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidData, "invalid Content-Length")
            })?;
            if length > MAX_MESSAGE_BYTES {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "Content-Length {} exceeds limit of {} bytes",
                        length, MAX_MESSAGE_BYTES
                    ),
                ));
            }

            // Skip any remaining headers up to the blank separator line.
            loop {
                line.clear();
                let bytes = reader.read_line(&mut line)?;
                if bytes == 0 {
                    return Ok(None);
                }
                if line == "\r\n" || line == "\n" {
                    break;
                }
            }

            let mut buffer = vec![0u8; length];
            reader.read_exact(&mut buffer)?;
            *output_mode = OutputMode::ContentLength;
            return Ok(Some(String::from_utf8_lossy(&buffer).to_string()));
        }

        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            continue;
        }
        *output_mode = OutputMode::Line;
        return Ok(Some(trimmed.to_string()));
    }
}

fn write_message(
    writer: &mut impl Write,
    output_mode: OutputMode,
    message: &Value,
) -> io::Result<()> {
    let text = serde_json::to_string(message)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

    match output_mode {
        OutputMode::Line => {
            writeln!(writer, "{}", text)?;
        }
        OutputMode::ContentLength => {
            write!(writer, "Content-Length: {}\r\n\r\n{}", text.len(), text)?;
        }
    }

    writer.flush()
}

fn ok_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

fn error_response(id: Value, code: i32, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message,
        }
    })
}

enum CallError {
    InvalidParams(String),
    NoCache,
}

impl CallError {
    fn into_response(self, id: Value) -> Value {
        match self {
            CallError::InvalidParams(message) => error_response(id, -32602, &message),
            CallError::NoCache => error_response(
                id,
                NO_CACHE,
                "no cache has been created; call cache/create first",
            ),
        }
    }
}

/// Holds the cache versions produced over one stdio session.
#[derive(Default)]
struct Session {
    history: Option<CacheHistory<String, Value>>,
}

impl Session {
    fn handle_message(&mut self, message: Value) -> Option<Value> {
        let Some(obj) = message.as_object() else {
            return Some(error_response(Value::Null, -32600, "Invalid Request"));
        };
        let id = obj.get("id").cloned();
        let method = obj.get("method").and_then(|value| value.as_str());

        let Some(method) = method else {
            return id.map(|id| error_response(id, -32600, "Invalid Request"));
        };

        log::debug!("request method={}", method);

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        let result = match method {
            "initialize" => Ok(initialize_result()),
            "ping" => Ok(json!({})),
            "shutdown" => Ok(Value::Null),
            "initialized" => return None,
            "cache/create" => self.create(&params),
            "cache/put" => self.put(&params),
            "cache/get" => self.get(&params),
            "cache/peek" => self.peek(&params),
            "cache/remove" => self.remove(&params),
            "cache/snapshot" => self.snapshot(&params),
            "cache/checkout" => self.checkout(&params),
            "cache/history" => self.list_history(),
            _ => return id.map(|id| error_response(id, -32601, "Method not found")),
        };

        // Notifications still run, they just get no reply.
        let id = id?;
        Some(match result {
            Ok(result) => ok_response(id, result),
            Err(err) => err.into_response(id),
        })
    }

    fn history_mut(&mut self) -> Result<&mut CacheHistory<String, Value>, CallError> {
        self.history.as_mut().ok_or(CallError::NoCache)
    }

    fn create(&mut self, params: &Value) -> Result<Value, CallError> {
        let args = params_object(params)?;
        let capacity = match args.get("capacity") {
            Some(Value::Number(value)) => value.as_i64().ok_or_else(|| {
                CallError::InvalidParams("capacity must be an integer".to_string())
            })?,
            _ => {
                return Err(CallError::InvalidParams(
                    "capacity must be an integer".to_string(),
                ))
            }
        };
        let max_versions = get_optional_positive(args, "max_versions")?;
        let cache = Cache::try_with_capacity(capacity)
            .map_err(|err| CallError::InvalidParams(err.to_string()))?;

        if self.history.is_some() {
            log::debug!("replacing existing cache history");
        }
        let history = match max_versions {
            Some(max) => CacheHistory::with_retention(cache, max),
            None => CacheHistory::new(cache),
        };
        let version = history.head();
        self.history = Some(history);

        Ok(json!({
            "version": version,
            "capacity": capacity,
            "max_versions": max_versions,
        }))
    }

    fn put(&mut self, params: &Value) -> Result<Value, CallError> {
        let args = params_object(params)?;
        let key = get_required_key(args)?;
        let value = args
            .get("value")
            .cloned()
            .ok_or_else(|| CallError::InvalidParams("value is required".to_string()))?;

        let history = self.history_mut()?;
        let (next, evicted) = history.current().put(key, value);
        let len = next.len();
        let version = history.commit(next);

        let evicted = match evicted {
            Some((key, value)) => json!({ "key": key, "value": value }),
            None => Value::Null,
        };
        Ok(json!({ "version": version, "evicted": evicted, "len": len }))
    }

    fn get(&mut self, params: &Value) -> Result<Value, CallError> {
        let args = params_object(params)?;
        let key = get_required_key(args)?;

        let history = self.history_mut()?;
        let found = history.current().get(&key);
        match found {
            Some((next, value)) => {
                let version = history.commit(next);
                Ok(json!({ "version": version, "hit": true, "value": value }))
            }
            None => Ok(json!({ "version": history.head(), "hit": false, "value": null })),
        }
    }

    fn peek(&mut self, params: &Value) -> Result<Value, CallError> {
        let args = params_object(params)?;
        let key = get_required_key(args)?;

        let history = self.history_mut()?;
        let value = history.current().peek(&key).cloned();
        Ok(json!({
            "version": history.head(),
            "hit": value.is_some(),
            "value": value,
        }))
    }

    fn remove(&mut self, params: &Value) -> Result<Value, CallError> {
        let args = params_object(params)?;
        let key = get_required_key(args)?;

        let history = self.history_mut()?;
        let (next, removed) = history.current().remove(&key);
        let version = if removed.is_some() {
            history.commit(next)
        } else {
            history.head()
        };
        Ok(json!({ "version": version, "removed": removed }))
    }

    fn snapshot(&mut self, params: &Value) -> Result<Value, CallError> {
        let requested = match params {
            Value::Null => None,
            Value::Object(args) => get_optional_version(args)?,
            _ => {
                return Err(CallError::InvalidParams(
                    "params must be an object".to_string(),
                ))
            }
        };

        let history = self.history_mut()?;
        let version = requested.unwrap_or_else(|| history.head());
        let cache = history.version(version).ok_or_else(|| {
            CallError::InvalidParams(format!(
                "version {} does not exist (retained versions {}..{})",
                version,
                history.oldest(),
                history.oldest() + history.len()
            ))
        })?;

        let mut result = serde_json::to_value(Snapshot::of(cache))
            .map_err(|err| CallError::InvalidParams(err.to_string()))?;
        result["version"] = json!(version);
        Ok(result)
    }

    fn checkout(&mut self, params: &Value) -> Result<Value, CallError> {
        let args = params_object(params)?;
        let requested = get_optional_version(args)?
            .ok_or_else(|| CallError::InvalidParams("version is required".to_string()))?;

        let history = self.history_mut()?;
        let version = history
            .checkout(requested)
            .map_err(|err| CallError::InvalidParams(err.to_string()))?;
        log::debug!("checked out version {} as {}", requested, version);
        Ok(json!({ "version": version, "from": requested }))
    }

    fn list_history(&mut self) -> Result<Value, CallError> {
        let history = self.history_mut()?;
        let versions: Vec<Value> = history
            .versions()
            .map(|(version, cache)| {
                json!({
                    "version": version,
                    "len": cache.len(),
                    "next_stamp": cache.next_stamp(),
                })
            })
            .collect();
        Ok(json!({
            "head": history.head(),
            "oldest": history.oldest(),
            "max_versions": history.max_versions(),
            "versions": versions,
        }))
    }
}

fn initialize_result() -> Value {
    json!({
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "methods": METHODS,
        "history": { "retention": "unbounded unless cache/create sets max_versions" },
    })
}

fn params_object(params: &Value) -> Result<&Map<String, Value>, CallError> {
    params
        .as_object()
        .ok_or_else(|| CallError::InvalidParams("params must be an object".to_string()))
}

fn get_required_key(args: &Map<String, Value>) -> Result<String, CallError> {
    match args.get("key") {
        Some(value) => key_text(value).ok_or_else(|| {
            CallError::InvalidParams("key must be a string, number or boolean".to_string())
        }),
        None => Err(CallError::InvalidParams("key is required".to_string())),
    }
}

fn get_optional_positive(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<usize>, CallError> {
    match args.get(key) {
        Some(Value::Number(value)) => value
            .as_u64()
            .filter(|value| *value > 0)
            .map(|value| Some(value as usize))
            .ok_or_else(|| CallError::InvalidParams(format!("{} must be a positive integer", key))),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(CallError::InvalidParams(format!(
            "{} must be a positive integer",
            key
        ))),
    }
}

fn get_optional_version(args: &Map<String, Value>) -> Result<Option<usize>, CallError> {
    match args.get("version") {
        Some(Value::Number(value)) => value
            .as_u64()
            .map(|value| Some(value as usize))
            .ok_or_else(|| {
                CallError::InvalidParams("version must be a non-negative integer".to_string())
            }),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(CallError::InvalidParams(
            "version must be a non-negative integer".to_string(),
        )),
    }
}
