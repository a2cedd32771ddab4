use std::path::PathBuf;

use clap::{Parser, Subcommand};

use phasegate::api::{Backend, Confirmer, Notifier};
use phasegate::config::{self, PhasegateConfig};
use phasegate::engine::PhaseEngine;
use phasegate::log::parse_log_level;
use phasegate::rest::{RestBackend, RestNotifier};
use phasegate::types::{Decision, TransitionOutcome};

#[derive(Parser)]
#[command(name = "phasegate", about = "Phase transition engine for product workflows")]
struct Cli {
    /// Project root directory (defaults to current directory)
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Path to config file (defaults to {root}/phasegate.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log verbosity level (error, warn, info, debug)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Answer yes to every confirmation prompt
    #[arg(long)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the phase catalog in progression order
    Phases,
    /// Show a product's active phase and task state
    Status {
        /// Product id
        #[arg(long)]
        product: i64,
        /// Acting user's role id
        #[arg(long)]
        role: i64,
    },
    /// Move a product's active phase to another catalog phase
    Transition {
        #[arg(long)]
        product: i64,
        #[arg(long)]
        role: i64,
        /// Target phase id
        phase: i64,
    },
    /// Send the supervisor notification for the product's active phase
    Notify {
        #[arg(long)]
        product: i64,
        #[arg(long)]
        role: i64,
    },
    /// Toggle completion of one of the active phase's tasks
    Toggle {
        #[arg(long)]
        product: i64,
        #[arg(long)]
        role: i64,
        /// Task id within the active phase
        task: i64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match parse_log_level(&cli.log_level) {
        Ok(level) => phasegate::log::set_log_level(level),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }

    let config = match load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let result = run(cli, config).await;
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load(cli: &Cli) -> Result<PhasegateConfig, String> {
    match &cli.config {
        Some(path) => config::load_config_file(path),
        None => config::load_config(&cli.root),
    }
}

async fn run(cli: Cli, config: PhasegateConfig) -> Result<(), String> {
    let backend = RestBackend::new(&config.backend)?;
    let notifier = RestNotifier::new(&config.backend)?;
    let confirmer = CliConfirmer {
        assume_yes: cli.yes,
    };

    match cli.command {
        Commands::Phases => handle_phases(&backend).await,
        Commands::Status { product, role } => {
            let engine =
                PhaseEngine::load(config, backend, notifier, confirmer, product, role).await?;
            handle_status(&engine)
        }
        Commands::Transition {
            product,
            role,
            phase,
        } => {
            let mut engine =
                PhaseEngine::load(config, backend, notifier, confirmer, product, role).await?;
            match engine.request_transition(phase).await {
                Ok(TransitionOutcome::Moved) => {
                    let label = engine
                        .active_phase()
                        .map(|p| p.label())
                        .unwrap_or_default();
                    println!("Fase activa: {}", label);
                    Ok(())
                }
                Ok(TransitionOutcome::NoOp) => {
                    println!("Sin cambios");
                    Ok(())
                }
                Err(e) => Err(e.to_string()),
            }
        }
        Commands::Notify { product, role } => {
            let mut engine =
                PhaseEngine::load(config, backend, notifier, confirmer, product, role).await?;
            let phase_id = engine
                .active_phase()
                .map(|p| p.id)
                .ok_or_else(|| "El catálogo de fases está vacío".to_string())?;
            engine
                .send_supervisor_notification(phase_id)
                .await
                .map_err(|e| e.to_string())
        }
        Commands::Toggle {
            product,
            role,
            task,
        } => {
            let mut engine =
                PhaseEngine::load(config, backend, notifier, confirmer, product, role).await?;
            let completed = engine
                .toggle_task_completion(task)
                .await
                .map_err(|e| e.to_string())?;
            println!(
                "Tarea {}: {}",
                task,
                if completed { "completada" } else { "pendiente" }
            );
            Ok(())
        }
    }
}

async fn handle_phases(backend: &RestBackend) -> Result<(), String> {
    let phases = backend.list_phases().await.map_err(|e| e.to_string())?;
    if phases.is_empty() {
        println!("(catálogo vacío)");
        return Ok(());
    }
    for (index, phase) in phases.iter().enumerate() {
        println!("  {}. [{}] {}", index + 1, phase.id, phase.label());
    }
    Ok(())
}

fn handle_status<B: Backend, N: Notifier, C: Confirmer>(
    engine: &PhaseEngine<B, N, C>,
) -> Result<(), String> {
    match engine.active_phase() {
        Some(phase) => println!("Fase activa: {} [{}]", phase.label(), phase.id),
        None => println!("Fase activa: (catálogo vacío)"),
    }

    let caps = engine.capabilities();
    println!(
        "Rol: {}",
        if caps.is_supervisor {
            "supervisor"
        } else {
            "estándar"
        }
    );

    if engine.active_tasks().is_empty() {
        println!("Tareas: (ninguna)");
    } else {
        println!("Tareas:");
        for task in engine.active_tasks() {
            let marker = if engine.task_completed(task.id) { "x" } else { " " };
            println!("  [{}] {} ({})", marker, task.name, task.id);
        }
        println!(
            "Validación del supervisor: {}",
            if engine.validation_cached() { "sí" } else { "pendiente" }
        );
    }

    if let Some(message) = engine.last_error() {
        println!("Último error: {}", message);
    }
    Ok(())
}

/// Confirmation prompts on stderr, answers from stdin. `--yes` accepts
/// everything and picks the first recipient.
struct CliConfirmer {
    assume_yes: bool,
}

impl Confirmer for CliConfirmer {
    async fn confirm(&self, message: &str) -> Decision {
        if self.assume_yes {
            return Decision::Accepted;
        }
        eprintln!("{}", message);
        eprint!("[s/N] ");
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return Decision::Declined;
        }
        match line.trim().to_lowercase().as_str() {
            "s" | "si" | "sí" | "y" | "yes" => Decision::Accepted,
            _ => Decision::Declined,
        }
    }

    async fn choose_recipient(&self, recipients: &[String]) -> Option<usize> {
        if self.assume_yes {
            return Some(0);
        }
        eprintln!("Destinatarios disponibles:");
        for (index, recipient) in recipients.iter().enumerate() {
            eprintln!("  {}. {}", index + 1, recipient);
        }
        eprint!("Elige destinatario [1-{}]: ", recipients.len());
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).ok()?;
        let choice: usize = line.trim().parse().ok()?;
        (1..=recipients.len()).contains(&choice).then(|| choice - 1)
    }
}
