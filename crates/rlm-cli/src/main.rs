mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use rlm_agent::{
    AgentConfig, AgentError, AiClient, CapabilitySet, ClaudeClient, ClaudeConfig, Engine,
    InvocationRequest,
};
use rlm_common::RlmError;
use rlm_config::RlmConfig;
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

/// Exit status when the step budget ran out without an answer.
const EXIT_MAX_STEPS: u8 = 2;

/// Load environment variables from a .env file (KEY=VALUE lines).
fn load_dotenv() {
    let manifest_dir = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let candidates = [
        // Workspace root, two levels up from crates/rlm-cli/
        manifest_dir.join("..").join("..").join(".env"),
        std::path::PathBuf::from(".env"),
    ];

    for path in &candidates {
        if let Ok(contents) = std::fs::read_to_string(path) {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    let key = key.trim();
                    let value = value.trim().trim_matches('"').trim_matches('\'');
                    if std::env::var(key).is_err() {
                        std::env::set_var(key, value);
                    }
                }
            }
            return;
        }
    }
}

fn init_logging(directive: &str) {
    let directive = directive
        .parse()
        .unwrap_or_else(|_| "info".parse().expect("static directive"));
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &cli::Args) -> Result<RlmConfig, RlmError> {
    let config = match &args.config {
        Some(path) => rlm_config::load_config_from(path)?,
        None => rlm_config::load_config()?,
    };
    Ok(config)
}

fn build_engine(config: &RlmConfig) -> Result<Engine, RlmError> {
    let claude = ClaudeConfig::from_env()?.with_model_config(&config.model);
    let client: Arc<dyn AiClient> = Arc::new(ClaudeClient::new(claude.clone())?);

    let mut engine = Engine::new(client, AgentConfig::from(config)).with_observer(|record| {
        tracing::debug!(
            step = record.index,
            input_tokens = record.usage.input_tokens,
            output_tokens = record.usage.output_tokens,
            "step finished"
        );
    });

    if let Some(model) = &config.model.sub_query_model {
        tracing::info!("Sub-queries use {model}");
        let sub_client = ClaudeClient::new(claude.with_model(model.clone()))?;
        engine = engine.with_sub_query_client(Arc::new(sub_client));
    }
    Ok(engine)
}

/// Read the document and assemble the engine and its request.
fn prepare(args: cli::Args, config: &RlmConfig) -> Result<(Engine, InvocationRequest), RlmError> {
    let document = std::fs::read_to_string(&args.document)?;
    tracing::info!(
        "Loaded {} ({} chars)",
        args.document.display(),
        document.chars().count()
    );

    let engine = build_engine(config)?;
    let mut initial_values = Map::new();
    initial_values.insert("doc".to_string(), Value::String(document));

    let request = InvocationRequest {
        initial_values,
        capabilities: CapabilitySet::new(),
        schema: args.schema(),
        instructions: args.instructions,
    };
    Ok((engine, request))
}

fn fail(e: impl Into<RlmError>) -> ExitCode {
    let e = e.into();
    tracing::error!("{e}");
    eprintln!("rlm: {e}");
    ExitCode::FAILURE
}

#[tokio::main]
async fn main() -> ExitCode {
    load_dotenv();

    let args = cli::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("rlm: {e}");
            return ExitCode::FAILURE;
        }
    };

    let directive = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.as_directive().to_string());
    init_logging(&directive);

    tracing::info!("rlm v{} starting...", env!("CARGO_PKG_VERSION"));
    if let Some(ref path) = args.config {
        tracing::info!("Using config override: {}", path.display());
    }

    let (engine, request) = match prepare(args, &config) {
        Ok(prepared) => prepared,
        Err(e) => return fail(e),
    };

    match engine.invoke(request).await {
        Ok(fields) => {
            let json = serde_json::to_string_pretty(&Value::Object(fields))
                .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize result: {e}\"}}"));
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(AgentError::MaxSteps {
            steps_completed,
            step_ceiling,
            tokens_used,
            ..
        }) => {
            eprintln!(
                "rlm: no answer after {steps_completed}/{step_ceiling} steps \
                 ({tokens_used} tokens used)"
            );
            ExitCode::from(EXIT_MAX_STEPS)
        }
        Err(e) => fail(e),
    }
}
