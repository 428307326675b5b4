use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use neuronos_core::agent::{AgentConfig, AgentController, AgentOutcome};
use neuronos_core::cli::{AutoMode, Cli, Command, ModelMode};
use neuronos_core::engine::{Engine, NullEngine};
use neuronos_core::error::{NeuronError, Result};
use neuronos_core::hardware::HardwareInfo;
use neuronos_core::memory::MemoryStore;
use neuronos_core::registry;
use neuronos_core::settings::Settings;
use neuronos_core::tools;

fn install_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".neuronos")
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "neuronos=debug" } else { "neuronos=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            e.exit_code()
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<()> {
    let install_dir = install_dir();

    match cli.command {
        Command::Hwinfo => {
            let hw = HardwareInfo::detect();
            let profile_path = Settings::hw_profile_path(&install_dir);
            if let Some(parent) = profile_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&profile_path, serde_json::to_string_pretty(&hw)?)?;
            println!("{}", serde_json::to_string_pretty(&hw)?);
            Ok(())
        }

        Command::Scan { dir } => {
            let hw = HardwareInfo::detect();
            let entries = registry::scan(&dir, &hw)?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
            Ok(())
        }

        Command::Auto { mode } => {
            let hw = HardwareInfo::detect();
            let models_dir = cli.models.clone().unwrap_or_else(|| Settings::default().models_dir);
            let entries = registry::scan(&models_dir, &hw)?;
            let best = registry::select_best(&entries).ok_or_else(|| {
                NeuronError::NotFound(format!("no usable model found under {}", models_dir.display()))
            })?;
            run_mode_on_model(&best.path.clone(), into_auto_mode(mode), &cli, &install_dir).await
        }

        Command::Model { path, mode } => match mode {
            ModelMode::Info => {
                let meta = neuronos_core::gguf::read_metadata(&path)?;
                println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                    "architecture": meta.architecture,
                    "name": meta.name,
                    "quantization": neuronos_core::gguf::quant_family_tag(&meta),
                    "file_size_bytes": meta.file_size_bytes,
                }))?);
                Ok(())
            }
            ModelMode::Generate { prompt } => {
                run_mode_on_model(&path, RunMode::Generate(prompt), &cli, &install_dir).await
            }
            ModelMode::Agent { prompt } => {
                run_mode_on_model(&path, RunMode::Agent(prompt), &cli, &install_dir).await
            }
            ModelMode::Chat { prompt } => {
                let prompt = prompt.unwrap_or_default();
                run_mode_on_model(&path, RunMode::Generate(prompt), &cli, &install_dir).await
            }
        },
    }
}

enum RunMode {
    Generate(String),
    Agent(String),
}

fn into_auto_mode(mode: AutoMode) -> RunMode {
    match mode {
        AutoMode::Generate { prompt } => RunMode::Generate(prompt),
        AutoMode::Agent { prompt } => RunMode::Agent(prompt),
    }
}

async fn run_mode_on_model(
    path: &std::path::Path,
    mode: RunMode,
    cli: &Cli,
    install_dir: &std::path::Path,
) -> Result<()> {
    tracing::info!(model = %path.display(), "selected model");

    // The native engine is a collaborator concern (spec §1); without the
    // `native-engine` feature wired to real weights, NullEngine stands in
    // so the CLI surface and agent loop remain exercisable end-to-end.
    let engine: Arc<dyn Engine> = Arc::new(NullEngine::new());

    match mode {
        RunMode::Generate(prompt) => {
            engine
                .generate(
                    neuronos_core::engine::GenerateRequest {
                        prompt,
                        max_tokens: cli.max_tokens.unwrap_or(512),
                        temperature: cli.temp.unwrap_or(0.7),
                        top_p: 1.0,
                        top_k: 40,
                        grammar: cli.grammar.clone(),
                        seed: None,
                    },
                    Box::new(|chunk| {
                        print!("{chunk}");
                        true
                    }),
                )
                .await
                .map_err(|e| NeuronError::EngineError(e.to_string()))?;
            println!();
            Ok(())
        }

        RunMode::Agent(prompt) => {
            let memory = Arc::new(MemoryStore::open(&Settings::memory_db_path(install_dir))?);
            let tool_registry = tools::with_builtins_and_memory(memory.clone())?;

            let mut config = AgentConfig::default();
            if let Some(max_steps) = cli.max_steps {
                config.max_steps = max_steps;
            }
            if let Some(temp) = cli.temp {
                config.temperature = temp;
            }
            if let Some(max_tokens) = cli.max_tokens {
                config.max_tokens_per_step = max_tokens;
            }

            let mut controller = AgentController::new(
                engine,
                tool_registry,
                memory,
                config,
                tools::Capabilities::all(),
            );

            let outcome = controller
                .run(
                    &prompt,
                    Box::new(|ev| {
                        if let Some(obs) = &ev.observation {
                            tracing::info!(step = ev.step, tool_observation = %obs, "agent step");
                        }
                    }),
                )
                .await?;

            match outcome {
                AgentOutcome::Final { answer, .. } => {
                    println!("{answer}");
                    Ok(())
                }
                AgentOutcome::Failed { reason, best_effort_answer, steps } => {
                    if let Some(answer) = &best_effort_answer {
                        println!("{answer}");
                    }
                    Err(match reason {
                        neuronos_core::agent::FailReason::StepBudgetExhausted => {
                            NeuronError::StepBudgetExhausted(steps)
                        }
                        neuronos_core::agent::FailReason::EngineError(msg) => {
                            NeuronError::EngineError(msg)
                        }
                        _ => NeuronError::ParseError("agent failed to produce valid output".into()),
                    })
                }
                AgentOutcome::Cancelled { .. } => Err(NeuronError::Cancelled),
            }
        }
    }
}
