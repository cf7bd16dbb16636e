use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futurecast::config::{Config, RegenerationPolicy};
use futurecast::engine::generation::TextGenerationClient;
use futurecast::engine::tree_engine::{estimate_generation_calls, TreeGenerationEngine};
use futurecast::model::effect::EffectTree;
use futurecast::model::intent::ChatIntent;
use futurecast::session::Session;
use futurecast::storage::Storage;

#[derive(Parser)]
#[command(name = "futurecast")]
#[command(about = "Predict cascading effects of an event", long_about = None)]
#[command(version)]
struct Cli {
    /// Generation model, overriding settings and environment
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Directory of saved futurecasts
    #[arg(long, global = true)]
    saved_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a new effect tree and summary, then save it
    Predict {
        context: String,
        /// Effects per parent
        #[arg(short, long)]
        effects: Option<usize>,
        /// Maximum effect order
        #[arg(short, long)]
        depth: Option<usize>,
    },
    /// Print a saved futurecast (latest by default)
    Show { file: Option<PathBuf> },
    /// Change one effect's text in the latest futurecast
    Modify {
        /// Dotted effect path such as 1.2
        path: String,
        text: String,
        /// Regrow the effects below instead of marking them
        #[arg(long)]
        regenerate: bool,
    },
    /// Grow a chain of effects below a leaf of the latest futurecast
    Expand {
        path: String,
        #[arg(short, long, default_value_t = 1)]
        levels: i64,
        #[arg(short, long)]
        focus: Option<String>,
    },
    /// Ask a question about the latest futurecast
    Ask { question: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load().context("loading configuration")?;
    if let Some(model) = cli.model {
        config.model_name = model;
        config.model_from_env = true;
    }
    if let Some(dir) = cli.saved_dir {
        config.saved_dir = dir;
    }
    let storage = Storage::new(config.saved_dir.clone());

    match cli.command {
        Command::Predict {
            context,
            effects,
            depth,
        } => {
            if let Some(effects) = effects {
                config.num_effects = effects;
            }
            if let Some(depth) = depth {
                config.max_depth = depth;
            }
            config.validate()?;

            let client = TextGenerationClient::from_config(&config)?;
            let engine = TreeGenerationEngine::new(&client, config.max_depth, config.num_effects);
            println!(
                "Estimated {} effects from {} generation calls.",
                engine.estimated_node_count(),
                estimate_generation_calls(config.num_effects, config.max_depth) + 1
            );

            let prediction = engine.predict(&context).await?;
            if !prediction.blocked.is_empty() {
                let blocked: Vec<String> =
                    prediction.blocked.iter().map(|p| p.to_string()).collect();
                println!("Generation was blocked below: {}", blocked.join(", "));
            }

            let path = storage.save(&prediction.tree, &prediction.summary)?;
            print_futurecast(&prediction.tree, &prediction.summary);
            println!("\nSaved to {}", path.display());
        }
        Command::Show { file } => {
            let saved = match file {
                Some(path) => storage.load(&path)?,
                None => storage.load_latest()?,
            };
            print_futurecast(&saved.tree, &saved.summary);
        }
        Command::Modify {
            path,
            text,
            regenerate,
        } => {
            if regenerate {
                config.regeneration = RegenerationPolicy::Regenerate;
            }
            if config.regeneration == RegenerationPolicy::Regenerate {
                config.validate()?;
            }
            let client = TextGenerationClient::from_config(&config)?;
            let mut session = latest_session(&storage)?;

            let reply = session.modify_effect(&path, &text, &client, &config).await?;
            save_session(&storage, &session)?;
            println!("{reply}");
        }
        Command::Expand {
            path,
            levels,
            focus,
        } => {
            let mut session = latest_session(&storage)?;
            let reply = session.expand_effect(&path, levels, focus.as_deref())?;
            save_session(&storage, &session)?;
            println!("{reply}");
        }
        Command::Ask { question } => {
            config.validate()?;
            let client = TextGenerationClient::from_config(&config)?;
            let mut session = latest_session(&storage)?;
            let reply = session
                .dispatch(ChatIntent::AskGeneralQuestion { question }, &client, &config)
                .await;
            println!("{reply}");
        }
    }

    Ok(())
}

fn latest_session(storage: &Storage) -> Result<Session> {
    let saved = storage
        .load_latest()
        .context("no saved futurecast; run `futurecast predict` first")?;
    let mut session = Session::new();
    session.load_saved(saved);
    Ok(session)
}

fn save_session(storage: &Storage, session: &Session) -> Result<()> {
    let tree = session.tree().context("session has no effect tree")?;
    let path = storage.save(tree, session.summary().unwrap_or_default())?;
    println!("Saved to {}", path.display());
    Ok(())
}

fn print_futurecast(tree: &EffectTree, summary: &str) {
    println!("Event: {}\n", tree.context);
    print!("{}", tree.outline());
    if !summary.is_empty() {
        println!("\nSummary:\n{}", summary.trim());
    }
}
