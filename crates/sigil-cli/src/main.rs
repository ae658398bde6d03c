//! Sigil CLI - Command-line interface for the node catalog and signature store

use anyhow::Context;
use clap::Parser;
use serde_json::{Map, Value};
use sigil_core::{AuthData, NodeService, OperationCategory, Request, SigilConfig};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sigil")]
#[command(about = "Sigil - Node capability catalog and authentication signature store")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "sigil.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// List node types
    Nodes {
        /// Only nodes offering this category (create, read, update, delete, other)
        #[arg(long, value_parser = parse_category)]
        category: Option<OperationCategory>,
        /// Only nodes that require credentials
        #[arg(long)]
        auth_required: bool,
    },
    /// Show one node type
    Node { node_type: String },
    /// List operations of a node type
    Ops { node_type: String },
    /// Search operations by name, node or description
    Search { query: String },
    /// Show one operation
    Op { node_type: String, operation: String },
    /// Show a user's signature (never credentials)
    Signature {
        node_type: Option<String>,
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Enable a node type for a user
    Add {
        node_type: String,
        #[arg(short, long)]
        user: Option<String>,
        /// Credential field, repeatable
        #[arg(long = "auth", value_parser = parse_pair)]
        auth: Vec<(String, String)>,
        /// Parameter default, repeatable
        #[arg(long = "default", value_parser = parse_pair)]
        defaults: Vec<(String, String)>,
        /// Comma-separated operation whitelist; omit to enable all
        #[arg(long, value_delimiter = ',', conflicts_with = "no_ops")]
        ops: Option<Vec<String>>,
        /// Enable no operations
        #[arg(long)]
        no_ops: bool,
    },
    /// Remove a node type from a user's signature
    Remove {
        node_type: String,
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Merge parameter defaults into an enabled node
    Defaults {
        node_type: String,
        #[arg(short, long)]
        user: Option<String>,
        #[arg(long = "set", value_parser = parse_pair, required = true)]
        set: Vec<(String, String)>,
    },
    /// Replace the operation whitelist of an enabled node
    SetOps {
        node_type: String,
        #[arg(short, long)]
        user: Option<String>,
        /// Operations to enable; none disables all
        operations: Vec<String>,
    },
    /// Check call parameters for an operation
    Validate {
        node_type: String,
        operation: String,
        #[arg(short, long)]
        user: Option<String>,
        #[arg(long = "param", value_parser = parse_pair)]
        params: Vec<(String, String)>,
    },
    /// Show node availability for a user
    View {
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Rescan definitions and reconcile the default user
    Rebuild,
    /// Dispatch a raw JSON request
    Request { json: String },
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

fn parse_category(raw: &str) -> Result<OperationCategory, String> {
    OperationCategory::parse(raw).ok_or_else(|| format!("unknown category '{}'", raw))
}

fn load_config(path: &Path) -> anyhow::Result<SigilConfig> {
    if path.exists() {
        SigilConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
    } else {
        debug!("No config at {}, using defaults", path.display());
        Ok(SigilConfig::default())
    }
}

fn to_request(command: Commands) -> anyhow::Result<Request> {
    let request = match command {
        Commands::Nodes {
            category,
            auth_required,
        } => Request::ListNodes {
            category,
            auth_required,
        },
        Commands::Node { node_type } => Request::GetNode { node_type },
        Commands::Ops { node_type } => Request::ListOperations { node_type },
        Commands::Search { query } => Request::SearchOperations { query },
        Commands::Op {
            node_type,
            operation,
        } => Request::GetOperationDetails {
            node_type,
            operation,
        },
        Commands::Signature { node_type, user } => Request::GetSignatureInfo {
            user_id: user,
            node_type,
        },
        Commands::Add {
            node_type,
            user,
            auth,
            defaults,
            ops,
            no_ops,
        } => Request::AddNodeToSignature {
            user_id: user,
            node_type,
            auth: auth.into_iter().collect::<AuthData>(),
            defaults: defaults.into_iter().collect::<BTreeMap<_, _>>(),
            operations: if no_ops { Some(Vec::new()) } else { ops },
        },
        Commands::Remove { node_type, user } => Request::RemoveNodeFromSignature {
            user_id: user,
            node_type,
        },
        Commands::Defaults {
            node_type,
            user,
            set,
        } => Request::UpdateNodeDefaults {
            user_id: user,
            node_type,
            defaults: set.into_iter().collect(),
        },
        Commands::SetOps {
            node_type,
            user,
            operations,
        } => Request::SetOperations {
            user_id: user,
            node_type,
            operations,
        },
        Commands::Validate {
            node_type,
            operation,
            user,
            params,
        } => Request::ValidateParams {
            user_id: user,
            node_type,
            operation,
            params: params
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect::<Map<_, _>>(),
        },
        Commands::View { user } => Request::Availability { user_id: user },
        Commands::Rebuild => Request::RebuildCatalog,
        Commands::Request { json } => {
            serde_json::from_str(&json).context("parsing request JSON")?
        }
    };
    Ok(request)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli.config)?;
    let service = NodeService::new(config).context("starting node service")?;
    let request = to_request(cli.command)?;

    let reply = service.handle(request).await;
    println!("{}", serde_json::to_string_pretty(&reply)?);

    if reply["success"] != Value::Bool(true) {
        std::process::exit(1);
    }
    Ok(())
}
