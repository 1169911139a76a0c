use std::io::Read;
use std::sync::Arc;

use anyhow::{bail, Context as _};
use clap::Parser;
use graphorm::config::{self, EngineConfig};
use graphorm::sql_builder::SqlDialect;
use graphorm::type_catalog::{init_global_registry, TypeCatalogConfig};
use graphorm::{GraphOrm, RequestedNode, SqliteStorage};

/// GraphORM - compile a requested object graph into SQL and run it
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Declarative type catalog (YAML), overrides GRAPHORM_SCHEMA
    #[arg(long)]
    schema: Option<String>,

    /// SQLite database file, overrides GRAPHORM_DATABASE
    #[arg(long)]
    database: Option<String>,

    /// Requested field tree as JSON, `-` for stdin
    #[arg(long, default_value = "-")]
    request: String,

    /// Caller identity
    #[arg(long)]
    user_id: Option<String>,

    /// Caller has a premium subscription
    #[arg(long)]
    premium: bool,

    /// Print the compiled root statement instead of executing it
    #[arg(long)]
    sql_only: bool,

    /// SQL dialect (sqlite or postgresql)
    #[arg(long)]
    dialect: Option<SqlDialect>,

    /// Per-parent row ceiling for unpaginated many-relations
    #[arg(long)]
    max_relation_rows: Option<u64>,

    /// Maximum requested-tree depth
    #[arg(long)]
    max_depth: Option<usize>,
}

impl Cli {
    /// Command line flags override the environment.
    fn config_over(&self, env: EngineConfig) -> config::CliConfig {
        config::CliConfig {
            database_path: self.database.clone().unwrap_or(env.database_path),
            schema_path: self.schema.clone().or(env.schema_path),
            dialect: self.dialect.unwrap_or(env.dialect),
            max_relation_rows: self.max_relation_rows.unwrap_or(env.max_relation_rows),
            max_depth: self.max_depth.unwrap_or(env.max_depth),
        }
    }
}

fn read_request(source: &str) -> anyhow::Result<RequestedNode> {
    let text = if source == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("reading request from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(source).with_context(|| format!("reading request file {}", source))?
    };
    serde_json::from_str(&text).context("parsing requested field tree")
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = EngineConfig::from_cli(cli.config_over(EngineConfig::from_env()?))?;

    let Some(schema_path) = config.schema_path.as_deref() else {
        bail!("no type catalog given (--schema or GRAPHORM_SCHEMA)");
    };
    let registry = TypeCatalogConfig::from_yaml_file(schema_path)?.build_registry()?;
    let registry = init_global_registry(registry)?;

    let storage = SqliteStorage::open(&config.database_path)?;
    let orm = GraphOrm::new(registry, Arc::new(storage)).with_settings(config.planner_settings());

    let request = read_request(&cli.request)?;
    let mut ctx = orm.context().with_premium(cli.premium);
    if let Some(user_id) = &cli.user_id {
        ctx = ctx.with_user(user_id.clone());
    }

    if cli.sql_only {
        let statement = orm.compile_sql(&ctx, &request)?;
        println!("{}", statement.sql);
        println!("{}", serde_json::to_string_pretty(&statement.params)?);
        return Ok(());
    }

    if config.dialect != SqlDialect::SQLite {
        bail!("dialect {} can only be rendered (--sql-only), not executed", config.dialect);
    }

    let result = orm.query(&ctx, &request).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Initialize logger - defaults to INFO level, can be overridden with RUST_LOG env var
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
