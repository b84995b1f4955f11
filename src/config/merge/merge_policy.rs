//! Merge rules: defaults, override order, conflict handling.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

/// Create a Config builder with merge policy defaults applied.
///
/// Storage paths are left unset here; they are derived from `storage.data_dir` after
/// deserialization so a single data dir override moves all of them.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("fanout.top_k_docs", 7)?
        .set_default("rag.chunk_size", 1000)?
        .set_default("rag.chunk_overlap", 200)?
        .set_default("rag.image_similarity_threshold", 0.1)
}

/// Environment overrides are applied last: `LESSONFORGE__FANOUT__TASK_TIMEOUT_SECS=90`.
pub fn with_environment(
    builder: ConfigBuilder<DefaultState>,
) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix("LESSONFORGE")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    )
}
