//! weft CLI: inspect the rule set and run cascades offline.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use weft::concept::ConceptRegistry;
use weft::concepts::{Dictionary, FileTracker, Library, PasswordAuthentication, Sessioning};
use weft::config::WeftConfig;
use weft::engine::Engine;
use weft::estimate::{HeuristicCompletion, IndexEstimator};
use weft::record::FieldMap;
use weft::requesting::Requesting;
use weft::rule::Term;
use weft::syncs;

#[derive(Parser)]
#[command(name = "weft", version, about = "Concept backend engine")]
struct Cli {
    /// Path to a TOML config file. Defaults are used when absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all registered rules.
    Rules,

    /// List routes: engine-routed paths and configured passthroughs.
    Routes,

    /// Compile every rule against the concept suite and report problems.
    Check,

    /// Manage the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run one request cascade in-process and print every record.
    Invoke {
        /// Route path, e.g. /PasswordAuthentication/register
        path: String,

        /// Request body as a JSON object.
        #[arg(long, default_value = "{}")]
        body: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file.
    Init {
        /// Destination path.
        path: PathBuf,
    },
    /// Print the effective configuration as TOML.
    Show,
}

fn load_config(path: Option<&PathBuf>) -> Result<WeftConfig> {
    match path {
        Some(path) => Ok(WeftConfig::load(path)?),
        None => Ok(WeftConfig::default()),
    }
}

fn build_engine(max_depth: usize) -> Result<Engine> {
    let estimator = Arc::new(IndexEstimator::new(Arc::new(HeuristicCompletion)));
    let registry = ConceptRegistry::new();
    registry.register(Arc::new(Requesting::new()))?;
    registry.register(Arc::new(PasswordAuthentication::new()))?;
    registry.register(Arc::new(Sessioning::new()))?;
    registry.register(Arc::new(Library::new()))?;
    registry.register(Arc::new(FileTracker::new(estimator)))?;
    registry.register(Arc::new(Dictionary::new()))?;
    Ok(Engine::new(registry, syncs::all(), max_depth)?)
}

/// Routes mentioned by request-trigger rules, deduplicated and sorted.
fn engine_routes() -> Vec<String> {
    let mut routes: Vec<String> = syncs::all()
        .iter()
        .flat_map(|rule| rule.when.iter())
        .filter(|clause| clause.op == "Requesting.request")
        .filter_map(|clause| {
            clause.input.iter().find_map(|(field, term)| match term {
                Term::Lit(value) if field == "path" => value.as_str().map(str::to_string),
                _ => None,
            })
        })
        .collect();
    routes.sort();
    routes.dedup();
    routes
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Rules => {
            for name in build_engine(config.max_depth)?.rule_names() {
                println!("{name}");
            }
        }

        Commands::Routes => {
            println!("Engine routes:");
            for route in engine_routes() {
                println!("  {route}");
            }
            println!("Passthrough routes:");
            for (route, justification) in &config.inclusions {
                println!("  {route}  ({justification})");
            }
        }

        Commands::Check => {
            let engine = build_engine(config.max_depth)?;
            println!(
                "{} rules across {} concepts, all targets resolved.",
                engine.rule_names().len(),
                engine.concepts().len()
            );
        }

        Commands::Config { action } => match action {
            ConfigAction::Init { path } => {
                WeftConfig::default().save(&path)?;
                println!("Wrote {}", path.display());
            }
            ConfigAction::Show => {
                print!("{}", toml::to_string_pretty(&config).into_diagnostic()?);
            }
        },

        Commands::Invoke { path, body } => {
            let fields: FieldMap = serde_json::from_str(&body).into_diagnostic()?;
            let engine = build_engine(config.max_depth)?;
            let cascade = engine.handle_request(&path, fields).await?;
            for record in cascade.records() {
                let outcome = match &record.outcome {
                    weft::concept::Reply::Success(output) => {
                        format!("ok {}", serde_json::Value::Object(output.clone()))
                    }
                    weft::concept::Reply::Error(message) => format!("error: {message}"),
                };
                println!(
                    "#{:<3} depth {}  {}  {}  -> {}",
                    record.seq,
                    record.depth,
                    record.op,
                    serde_json::Value::Object(record.input.clone()),
                    outcome
                );
            }
            let audit = cascade.audit();
            if !audit.is_clean() {
                println!("contract violations: {audit:?}");
            }
        }
    }

    Ok(())
}
