//! # reverie-inspect
//!
//! Read-only inspection of saved characters.
//!
//! ```text
//! reverie-inspect --db town.db list
//! reverie-inspect --db town.db show "Isabella Rodriguez" --kind thought
//! reverie-inspect --db town.db evidence "Isabella Rodriguez" node_42
//! reverie-inspect --db town.db --config reverie.toml retrieve "Isabella Rodriguez" "the party"
//! reverie-inspect spatial spatial_memory.json "the Ville:Hobbs Cafe"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use reverie_agent::{AgentConfig, SpatialIndex};
use reverie_core::cognition::CognitionService;
use reverie_core::persistence::{PersistenceEngine, SavedCharacter};
use reverie_core::{MemoryNode, MemoryStore, NodeId, NodeKind, RankingEngine};
use reverie_llm::{LlmCognition, Persona};

/// Inspect Reverie character memory
#[derive(Parser)]
#[command(name = "reverie-inspect")]
#[command(version, about, long_about = None)]
struct Cli {
    /// SQLite database holding saved characters
    #[arg(long, global = true, env = "REVERIE_DB", value_name = "FILE", default_value = "reverie.db")]
    db: PathBuf,

    /// Agent configuration (TOML)
    #[arg(short, long, global = true, env = "REVERIE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "REVERIE_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List saved characters
    List,

    /// Print a character's memory, newest first
    Show {
        /// Character name
        name: String,
        /// Only this kind of node
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
        /// Maximum number of nodes
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Print the evidence tree behind a thought
    Evidence {
        /// Character name
        name: String,
        /// Node id, e.g. `node_42` or `42`
        node: String,
    },

    /// Rank a character's events and thoughts against a query
    Retrieve {
        /// Character name
        name: String,
        /// Query text
        query: String,
        /// Number of results
        #[arg(short, default_value_t = 10)]
        k: usize,
    },

    /// Write a rotating backup of the database
    Backup,

    /// Query a spatial memory file
    Spatial {
        /// Spatial memory JSON
        file: PathBuf,
        /// `world`, `world:sector` or `world:sector:arena`; omit for an outline
        address: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Event,
    Thought,
    Chat,
}

impl From<KindArg> for NodeKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Event => Self::Event,
            KindArg::Thought => Self::Thought,
            KindArg::Chat => Self::Chat,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = match &cli.config {
        Some(path) => AgentConfig::from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => AgentConfig::default(),
    };

    match cli.command {
        Commands::List => {
            for name in open_db(&cli.db, &config)?.list_characters()? {
                println!("{name}");
            }
        }
        Commands::Show { name, kind, limit } => {
            let saved = load(&cli.db, &config, &name)?;
            print_summary(&name, &saved);
            let kind = kind.map(NodeKind::from);
            let nodes: Vec<&MemoryNode> = saved
                .store
                .nodes()
                .filter(|node| kind.is_none_or(|k| node.kind == k))
                .collect();
            for node in nodes.iter().rev().take(limit) {
                print_node(node, 0);
            }
        }
        Commands::Evidence { name, node } => {
            let saved = load(&cli.db, &config, &name)?;
            let id = parse_node_id(&node)?;
            print_evidence(&saved.store, id, 0)?;
        }
        Commands::Retrieve { name, query, k } => {
            let saved = load(&cli.db, &config, &name)?;
            let persona = Persona::new(name.as_str(), config.character.identity.as_str());
            let cognition = LlmCognition::from_config(&config.core, persona)?;
            let embedding = cognition.embedding(&query).await?;

            let ranking = RankingEngine::new(config.core.retrieval.clone());
            let candidates = saved.store.non_idle(&[NodeKind::Event, NodeKind::Thought]);
            for ranked in ranking.rank(&candidates, &embedding, k) {
                let node = saved.store.get(ranked.id)?;
                println!(
                    "{:.3} (rec {:.2} imp {:.2} rel {:.2})  {}  {}",
                    ranked.score,
                    ranked.breakdown.recency,
                    ranked.breakdown.importance,
                    ranked.breakdown.relevance,
                    node.id,
                    node.description
                );
            }
        }
        Commands::Backup => {
            let db = open_db(&cli.db, &config)?;
            db.create_rotating_backup()?;
            info!(db = %cli.db.display(), "Backup written");
        }
        Commands::Spatial { file, address } => {
            let index = SpatialIndex::from_file(&file)?;
            let answer = match address.as_deref() {
                None => Some(index.outline()),
                Some(address) => match address.matches(':').count() {
                    0 => index.accessible_sectors(address),
                    1 => index.accessible_arenas(address),
                    _ => index.accessible_objects(address),
                },
            };
            println!("{}", answer.ok_or_else(|| anyhow!("unknown address"))?);
        }
    }
    Ok(())
}

fn open_db(path: &Path, config: &AgentConfig) -> Result<PersistenceEngine> {
    if !path.exists() {
        bail!("database {} does not exist", path.display());
    }
    PersistenceEngine::open(path, &config.core.persistence)
        .with_context(|| format!("opening {}", path.display()))
}

fn load(path: &Path, config: &AgentConfig, name: &str) -> Result<SavedCharacter> {
    open_db(path, config)?
        .load_character(name)?
        .ok_or_else(|| anyhow!("no saved character named '{name}'"))
}

fn parse_node_id(raw: &str) -> Result<NodeId> {
    let digits = raw.strip_prefix("node_").unwrap_or(raw);
    let n = digits
        .parse::<u64>()
        .with_context(|| format!("'{raw}' is not a node id"))?;
    Ok(NodeId(n))
}

fn print_summary(name: &str, saved: &SavedCharacter) {
    println!(
        "{name}: {} events, {} thoughts, {} chats; reflection budget {}/{}",
        saved.store.count(NodeKind::Event),
        saved.store.count(NodeKind::Thought),
        saved.store.count(NodeKind::Chat),
        saved.counter.accumulated_importance,
        saved.counter.importance_threshold_max,
    );
}

fn print_node(node: &MemoryNode, indent: usize) {
    let pad = "  ".repeat(indent);
    println!(
        "{pad}{} [{}] {} importance={} depth={}  {}",
        node.id,
        node.kind,
        node.created_at.format("%Y-%m-%d %H:%M:%S"),
        node.importance,
        node.depth,
        node.description
    );
    for line in &node.transcript {
        println!("{pad}    {}: {}", line.speaker, line.text);
    }
}

fn print_evidence(store: &MemoryStore, id: NodeId, indent: usize) -> Result<()> {
    let node = store.get(id)?;
    print_node(node, indent);
    for cited in &node.evidence {
        print_evidence(store, *cited, indent + 1)?;
    }
    Ok(())
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}
