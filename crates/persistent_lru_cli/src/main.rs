use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use persistent_lru::{
    parse_script, replay_stream, replay_with_warnings, validate_script_with_source, CsvInput,
    InputFormat, InputSpec, JsonInput, ReplayError, ReplayOptions, ReplayWarning, ScriptError,
    ScriptFile,
};
use serde_json::json;

#[derive(Parser)]
#[command(name = "lru-replay")]
#[command(version, about = "Replay cache operation scripts against a persistent LRU cache")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Validate(ValidateArgs),
    Replay(ReplayArgs),
}

#[derive(Args)]
struct ValidateArgs {
    #[arg(short = 's', long)]
    script: PathBuf,
    #[arg(short = 'e', long, default_value = "text")]
    error_format: ErrorFormat,
}

#[derive(Args)]
struct ReplayArgs {
    #[arg(short = 's', long)]
    script: PathBuf,
    #[arg(short = 'i', long)]
    input: Option<PathBuf>,
    #[arg(short = 'f', long)]
    format: Option<FormatOverride>,
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
    #[arg(long)]
    ndjson: bool,
    #[arg(short = 'v', long)]
    validate: bool,
    #[arg(long)]
    strict: bool,
    #[arg(short = 'e', long, default_value = "text")]
    error_format: ErrorFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ErrorFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatOverride {
    Csv,
    Json,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Validate(args) => run_validate(args),
        Commands::Replay(args) => run_replay(args),
    };
    std::process::exit(exit_code);
}

fn run_validate(args: ValidateArgs) -> i32 {
    let (script, yaml) = match load_script(&args.script) {
        Ok(value) => value,
        Err(code) => return code,
    };

    match validate_script_with_source(&script, &yaml) {
        Ok(()) => {
            log::info!("{} is valid", args.script.display());
            0
        }
        Err(errors) => {
            emit_validation_errors(&errors, args.error_format);
            2
        }
    }
}

fn run_replay(args: ReplayArgs) -> i32 {
    let (mut script, yaml) = match load_script(&args.script) {
        Ok(value) => value,
        Err(code) => return code,
    };

    apply_format_override(&mut script, args.format);

    if args.validate {
        if let Err(errors) = validate_script_with_source(&script, &yaml) {
            emit_validation_errors(&errors, args.error_format);
            return 2;
        }
    }

    let input = match load_input(args.input.as_deref()) {
        Ok(value) => value,
        Err(code) => return code,
    };

    let options = ReplayOptions {
        strict: args.strict,
    };

    if args.ndjson {
        return run_replay_ndjson(
            &script,
            input.as_deref(),
            options,
            args.output,
            args.error_format,
        );
    }

    let (output, warnings) = match replay_with_warnings(&script, input.as_deref(), options) {
        Ok(result) => result,
        Err(err) => {
            emit_replay_error(&err, args.error_format);
            return 3;
        }
    };

    let output_text = match serde_json::to_string(&output) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("failed to serialize output JSON: {}", err);
            return 1;
        }
    };

    emit_replay_warnings(&warnings, args.error_format);

    if let Some(path) = args.output {
        if let Err(code) = prepare_output_dir(&path) {
            return code;
        }
        if let Err(err) = fs::write(&path, output_text.as_bytes()) {
            eprintln!("failed to write output: {}", err);
            return 1;
        }
    } else {
        println!("{}", output_text);
    }

    0
}

fn run_replay_ndjson(
    script: &ScriptFile,
    input: Option<&str>,
    options: ReplayOptions,
    output: Option<PathBuf>,
    error_format: ErrorFormat,
) -> i32 {
    let stream = match replay_stream(script, input, options) {
        Ok(stream) => stream,
        Err(err) => {
            emit_replay_error(&err, error_format);
            return 3;
        }
    };

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            if let Err(code) = prepare_output_dir(&path) {
                return code;
            }
            match fs::File::create(&path) {
                Ok(file) => Box::new(file),
                Err(err) => {
                    eprintln!("failed to write output: {}", err);
                    return 1;
                }
            }
        }
        None => Box::new(io::stdout()),
    };

    let mut writer = io::BufWriter::new(writer);

    for item in stream {
        let item = match item {
            Ok(item) => item,
            Err(err) => {
                let _ = writer.flush();
                emit_replay_error(&err, error_format);
                return 3;
            }
        };

        emit_replay_warnings(&item.warnings, error_format);

        let line = match serde_json::to_string(&item.step) {
            Ok(text) => text,
            Err(err) => {
                eprintln!("failed to serialize output JSON: {}", err);
                return 1;
            }
        };

        if let Err(err) = writeln!(writer, "{}", line) {
            eprintln!("failed to write output: {}", err);
            return 1;
        }
    }

    if let Err(err) = writer.flush() {
        eprintln!("failed to write output: {}", err);
        return 1;
    }

    0
}

fn load_script(path: &Path) -> Result<(ScriptFile, String), i32> {
    let yaml = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) => {
            eprintln!("failed to read script: {}", err);
            return Err(1);
        }
    };

    let script = match parse_script(&yaml) {
        Ok(script) => script,
        Err(err) => {
            eprintln!("failed to parse script: {}", err);
            return Err(1);
        }
    };

    Ok((script, yaml))
}

/// Forces the input format. A script without an input section gets one with
/// default options for the chosen format.
fn apply_format_override(script: &mut ScriptFile, format: Option<FormatOverride>) {
    let Some(format) = format else {
        return;
    };
    let format = match format {
        FormatOverride::Csv => InputFormat::Csv,
        FormatOverride::Json => InputFormat::Json,
    };
    let spec = script.input.get_or_insert(InputSpec {
        format,
        csv: None,
        json: None,
    });
    spec.format = format;
    match format {
        InputFormat::Csv if spec.csv.is_none() => {
            spec.csv = Some(CsvInput {
                has_header: true,
                delimiter: ",".to_string(),
                columns: None,
            });
        }
        InputFormat::Json if spec.json.is_none() => {
            spec.json = Some(JsonInput { records_path: None });
        }
        _ => {}
    }
}

fn load_input(path: Option<&Path>) -> Result<Option<String>, i32> {
    let Some(path) = path else {
        return Ok(None);
    };
    match fs::read_to_string(path) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            eprintln!("failed to read input: {}", err);
            Err(1)
        }
    }
}

fn prepare_output_dir(path: &Path) -> Result<(), i32> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(err) = fs::create_dir_all(parent) {
                eprintln!("failed to create output directory: {}", err);
                return Err(1);
            }
        }
    }
    Ok(())
}

fn emit_validation_errors(errors: &[ScriptError], format: ErrorFormat) {
    match format {
        ErrorFormat::Text => {
            for err in errors {
                emit_validation_text(err);
            }
        }
        ErrorFormat::Json => {
            let values: Vec<_> = errors.iter().map(validation_error_json).collect();
            eprintln!("{}", serde_json::to_string(&values).unwrap_or_default());
        }
    }
}

fn emit_validation_text(err: &ScriptError) {
    let mut parts = Vec::new();
    parts.push(format!("E {}", err.code.as_str()));
    if let Some(path) = &err.path {
        parts.push(format!("path={}", path));
    }
    if let Some(location) = &err.location {
        parts.push(format!("line={}", location.line));
        parts.push(format!("col={}", location.column));
    }
    parts.push(format!("msg=\"{}\"", err.message));
    eprintln!("{}", parts.join(" "));
}

fn validation_error_json(err: &ScriptError) -> serde_json::Value {
    let mut value = json!({
        "type": "validation",
        "code": err.code.as_str(),
        "message": err.message,
    });

    if let Some(path) = &err.path {
        value["path"] = json!(path);
    }
    if let Some(location) = &err.location {
        value["line"] = json!(location.line);
        value["column"] = json!(location.column);
    }

    value
}

fn emit_replay_error(err: &ReplayError, format: ErrorFormat) {
    match format {
        ErrorFormat::Text => {
            let mut parts = Vec::new();
            parts.push(format!("E {}", err.kind.as_str()));
            if let Some(path) = &err.path {
                parts.push(format!("path={}", path));
            }
            parts.push(format!("msg=\"{}\"", err.message));
            eprintln!("{}", parts.join(" "));
        }
        ErrorFormat::Json => {
            let mut value = json!({
                "type": "replay",
                "kind": err.kind.as_str(),
                "message": err.message,
            });
            if let Some(path) = &err.path {
                value["path"] = json!(path);
            }
            eprintln!("{}", serde_json::to_string(&vec![value]).unwrap_or_default());
        }
    }
}

fn emit_replay_warnings(warnings: &[ReplayWarning], format: ErrorFormat) {
    if warnings.is_empty() {
        return;
    }

    match format {
        ErrorFormat::Text => {
            for warning in warnings {
                let mut parts = Vec::new();
                parts.push(format!("W {}", warning.kind.as_str()));
                if let Some(path) = &warning.path {
                    parts.push(format!("path={}", path));
                }
                parts.push(format!("msg=\"{}\"", warning.message));
                eprintln!("{}", parts.join(" "));
            }
        }
        ErrorFormat::Json => {
            let values: Vec<_> = warnings.iter().map(replay_warning_json).collect();
            eprintln!("{}", serde_json::to_string(&values).unwrap_or_default());
        }
    }
}

fn replay_warning_json(warning: &ReplayWarning) -> serde_json::Value {
    let mut value = json!({
        "type": "warning",
        "kind": warning.kind.as_str(),
        "message": warning.message,
    });
    if let Some(path) = &warning.path {
        value["path"] = json!(path);
    }
    value
}
