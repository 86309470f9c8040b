mod cache;
mod error;
mod history;
mod locator;
mod model;
mod path;
mod persistent_map;
mod replay;
mod validator;

pub use cache::PersistentLru;
pub use error::{
    CacheError, CacheErrorKind, ErrorCode, ReplayError, ReplayErrorKind, ReplayWarning,
    ReplayWarningKind, ScriptError, ValidationResult, YamlLocation,
};
pub use history::{CacheHistory, HistoryError};
pub use model::{
    key_text, CacheSpec, CsvInput, InputFormat, InputSpec, JsonInput, OpKind, OpRecord,
    ScriptFile,
};
pub use persistent_map::PersistentMap;
pub use replay::{
    replay, replay_stream, replay_with_warnings, Entry, ReplayOptions, ReplayOutput, ReplayStats,
    ReplayStep, ReplayStream, Snapshot, StreamItem,
};
pub use validator::{validate_script, validate_script_with_source};

pub fn parse_script(yaml: &str) -> Result<ScriptFile, serde_yaml::Error> {
    serde_yaml::from_str(yaml)
}
