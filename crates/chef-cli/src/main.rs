mod config;
mod context;
mod generate_cmd;
mod pantry_cmds;
mod plan_cmds;
mod run_cmd;
mod signal;

use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use uuid::Uuid;

use chef_core::orchestrator::StockUsage;
use chef_core::settings::GenerationMode;
use chef_db::pool;

use config::ChefConfig;

#[derive(Parser)]
#[command(name = "chef", about = "Meal planner with recipe generation and shopping list upkeep")]
struct Cli {
    /// Database URL (overrides CHEF_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a chef config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/chef")]
        db_url: String,
        /// Base URL of an OpenAI-compatible API
        #[arg(long, default_value = config::DEFAULT_ENDPOINT)]
        endpoint: String,
        /// Model name
        #[arg(long, default_value = config::DEFAULT_MODEL)]
        model: String,
        /// API key (or set CHEF_API_KEY)
        #[arg(long)]
        api_key: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create the chef database and run migrations
    DbInit,
    /// Generate meal plans now and fill the shopping list
    Generate {
        /// morning (today) or evening (tonight and tomorrow); defaults to the configured mode
        #[arg(long)]
        mode: Option<GenerationMode>,
        /// Return after saving plans instead of waiting for recipes
        #[arg(long)]
        no_wait: bool,
    },
    /// Run the background scheduler until interrupted
    Run {
        /// Overrides the configured mode
        #[arg(long)]
        mode: Option<GenerationMode>,
    },
    /// Meal plan management
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Recipes
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Inventory management
    Inventory {
        #[command(subcommand)]
        command: InventoryCommands,
    },
    /// Shopping list management
    Shopping {
        #[command(subcommand)]
        command: ShoppingCommands,
    },
    /// Print shell completions
    Completions {
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// List plans starting at a date
    Show {
        /// First date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Number of days to list
        #[arg(long, default_value_t = 2)]
        days: u64,
    },
    /// Mark a plan as eaten
    Complete {
        plan_id: String,
        /// Stock used by the meal, as ITEM_ID=COUNT (repeatable)
        #[arg(long = "use", value_name = "ITEM_ID=COUNT", value_parser = parse_stock_use)]
        used: Vec<StockUsage>,
    },
    /// Delete a plan and its recipes
    Delete { plan_id: String },
    /// Replace a plan's menu; dishes are separated by ・
    Rename { plan_id: String, menu: String },
}

fn parse_stock_use(input: &str) -> Result<StockUsage, String> {
    let (id, count) = input
        .split_once('=')
        .ok_or_else(|| format!("expected ITEM_ID=COUNT, got {input:?}"))?;
    let item_id = Uuid::parse_str(id.trim()).map_err(|e| format!("invalid item ID {id:?}: {e}"))?;
    let used = count
        .trim()
        .parse::<i32>()
        .map_err(|e| format!("invalid count {count:?}: {e}"))?;
    if used < 0 {
        return Err(format!("count must be >= 0, got {used}"));
    }
    Ok(StockUsage { item_id, used })
}

#[derive(Subcommand)]
pub enum RecipeCommands {
    /// Show the recipes of a plan
    Show {
        plan_id: String,
        /// Generate recipes that are missing
        #[arg(long)]
        generate: bool,
    },
}

#[derive(Subcommand)]
pub enum InventoryCommands {
    /// Add an item to stock
    Add {
        name: String,
        /// Category name or Japanese label (e.g. meat, 野菜)
        #[arg(long, default_value = "other")]
        category: String,
        /// Expiry date (YYYY-MM-DD)
        #[arg(long)]
        expiry: Option<NaiveDate>,
        #[arg(long, default_value_t = 1)]
        count: i32,
    },
    /// List stock, soonest expiry first
    List,
    /// Remove an item from stock
    Remove { item_id: String },
    /// List items expiring soon
    Expiring {
        /// Window in days; defaults to the configured warning days
        #[arg(long)]
        days: Option<u32>,
    },
}

#[derive(Subcommand)]
pub enum ShoppingCommands {
    /// Show the shopping list
    List,
    /// Add an entry by hand
    Add {
        name: String,
        #[arg(long, default_value = "other")]
        category: String,
        #[arg(long, default_value_t = 1)]
        count: i32,
    },
    /// Tick an entry off
    Check {
        entry_id: String,
        /// Untick instead
        #[arg(long)]
        uncheck: bool,
    },
    /// Remove every automatically added entry
    ClearAuto,
    /// Add missing ingredients for the recipes of planned meals
    Fill {
        /// First date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value_t = 2)]
        days: u64,
    },
}

/// Execute `chef init`: write the config file.
fn cmd_init(
    db_url: &str,
    endpoint: &str,
    model: &str,
    api_key: Option<String>,
    force: bool,
) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let has_key = api_key.is_some();
    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_owned(),
        },
        generation: config::GenerationSection {
            endpoint: endpoint.to_owned(),
            model: model.to_owned(),
            api_key,
            ..config::GenerationSection::default()
        },
        settings: Default::default(),
    };

    config::save_config_to(&path, &cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!("  generation.endpoint = {endpoint}");
    println!("  generation.model = {model}");
    if !has_key {
        println!("  generation.api_key is unset; export CHEF_API_KEY or edit the file.");
    }
    println!();
    println!("Next: run `chef db-init` to create and migrate the database.");

    Ok(())
}

/// Execute `chef db-init`: create the database and run migrations.
async fn cmd_db_init(resolved: &ChefConfig) -> anyhow::Result<()> {
    println!("Initializing chef database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;
    println!("chef db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            db_url,
            endpoint,
            model,
            api_key,
            force,
        } => cmd_init(&db_url, &endpoint, &model, api_key, force),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "chef", &mut std::io::stdout());
            Ok(())
        }
        Commands::DbInit => {
            let resolved = ChefConfig::resolve(cli.database_url.as_deref())?;
            cmd_db_init(&resolved).await
        }
        Commands::Generate { mode, no_wait } => {
            let resolved = ChefConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let mode = mode.unwrap_or(resolved.settings.mode);
            let result = generate_cmd::run_generate(&resolved, &db_pool, mode, !no_wait).await;
            db_pool.close().await;
            result
        }
        Commands::Run { mode } => {
            let resolved = ChefConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let mode = mode.unwrap_or(resolved.settings.mode);
            let result = run_cmd::run_scheduler(&resolved, &db_pool, mode).await;
            db_pool.close().await;
            result
        }
        Commands::Plan { command } => {
            let resolved = ChefConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = plan_cmds::run_plan_command(command, &resolved, &db_pool).await;
            db_pool.close().await;
            result
        }
        Commands::Recipe {
            command: RecipeCommands::Show { plan_id, generate },
        } => {
            let resolved = ChefConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = plan_cmds::run_recipe_show(&resolved, &db_pool, &plan_id, generate).await;
            db_pool.close().await;
            result
        }
        Commands::Inventory { command } => {
            let resolved = ChefConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = pantry_cmds::run_inventory_command(command, &resolved, &db_pool).await;
            db_pool.close().await;
            result
        }
        Commands::Shopping { command } => {
            let resolved = ChefConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = pantry_cmds::run_shopping_command(command, &resolved, &db_pool).await;
            db_pool.close().await;
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn generate_parses_mode() {
        let cli = Cli::try_parse_from(["chef", "generate", "--mode", "evening", "--no-wait"]).unwrap();
        match cli.command {
            Commands::Generate { mode, no_wait } => {
                assert_eq!(mode, Some(GenerationMode::Evening));
                assert!(no_wait);
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(Cli::try_parse_from(["chef", "generate", "--mode", "noon"]).is_err());
    }

    #[test]
    fn inventory_add_parses_expiry() {
        let cli = Cli::try_parse_from([
            "chef",
            "inventory",
            "add",
            "牛乳",
            "--category",
            "乳製品",
            "--expiry",
            "2026-03-12",
        ])
        .unwrap();
        match cli.command {
            Commands::Inventory {
                command: InventoryCommands::Add { name, expiry, count, .. },
            } => {
                assert_eq!(name, "牛乳");
                assert_eq!(expiry, NaiveDate::from_ymd_opt(2026, 3, 12));
                assert_eq!(count, 1);
            }
            _ => panic!("expected inventory add"),
        }
    }

    #[test]
    fn plan_complete_parses_stock_use() {
        let eggs = Uuid::new_v4();
        let rice = Uuid::new_v4();
        let cli = Cli::try_parse_from([
            "chef".to_owned(),
            "plan".to_owned(),
            "complete".to_owned(),
            Uuid::nil().to_string(),
            "--use".to_owned(),
            format!("{eggs}=2"),
            "--use".to_owned(),
            format!("{rice}=1"),
        ])
        .unwrap();
        match cli.command {
            Commands::Plan {
                command: PlanCommands::Complete { used, .. },
            } => {
                assert_eq!(
                    used,
                    vec![
                        StockUsage { item_id: eggs, used: 2 },
                        StockUsage { item_id: rice, used: 1 },
                    ]
                );
            }
            _ => panic!("expected plan complete"),
        }

        let bad = format!("{eggs}=-1");
        assert!(Cli::try_parse_from(["chef", "plan", "complete", "x", "--use", bad.as_str()]).is_err());
        assert!(Cli::try_parse_from(["chef", "plan", "complete", "x", "--use", "卵"]).is_err());
    }

    #[test]
    fn database_url_is_global() {
        let cli = Cli::try_parse_from([
            "chef",
            "shopping",
            "list",
            "--database-url",
            "postgresql://h:5432/x",
        ])
        .unwrap();
        assert_eq!(cli.database_url.as_deref(), Some("postgresql://h:5432/x"));
    }
}
