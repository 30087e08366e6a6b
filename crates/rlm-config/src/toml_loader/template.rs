//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# rlm configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[engine]
# max_steps = 20                 # 1-200 model turns per invocation
# history_preview_chars = 5000   # per-step output shown to the fallback extractor

[sub_query]
# max_calls = 50                 # 1-10000 sub-queries per invocation
# max_context_chars = 100000     # context strings are truncated to this length
# batch_concurrency = 8          # 1-64 workers for llm_query_batched
# high_water_fraction = 0.8      # 0.0-1.0, warn the model past this share of max_calls

[sandbox]
# exec_timeout_ms = 180000       # 100-3600000
# memory_limit_mb = 256          # 16-4096
# max_stack_kb = 1024            # 64-65536
# max_output_chars = 100000      # 100-10000000

[model]
# model = "claude-sonnet-4-20250514"
# sub_query_model = "claude-haiku-4-5"
# max_tokens = 4096              # 1-64000
# temperature = 0.0              # 0.0-1.0
# request_timeout_secs = 120     # 1-3600

[logging]
# level = "info"                 # trace, debug, info, warn, error
"##
    .to_string()
}
