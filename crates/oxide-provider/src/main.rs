use clap::{Parser, Subcommand};
use oxide_provider::{OxideProvider, protocol};
use tokio::io::BufReader;

#[derive(Parser)]
#[command(name = "oxide-provider")]
#[command(about = "Infrastructure-as-code provider for the Oxide cloud", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the lifecycle protocol on stdin/stdout (default)
    Serve,
    /// Print the schema of the provider, or of one resource type
    Schema {
        /// Resource type name, e.g. oxide_instance
        type_name: Option<String>,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries the protocol stream, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_ansi(false)
        .init();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let provider = OxideProvider::new()?;
            tracing::info!("oxide-provider {} serving on stdio", env!("CARGO_PKG_VERSION"));
            protocol::serve(
                &provider,
                BufReader::new(tokio::io::stdin()),
                tokio::io::stdout(),
            )
            .await?;
        }
        Commands::Schema { type_name } => {
            let provider = OxideProvider::new()?;
            let schema = match type_name {
                Some(type_name) => {
                    let driver = provider.driver(&type_name).await?;
                    serde_json::to_value(driver.schema())?
                }
                None => serde_json::json!({
                    "provider": OxideProvider::schema(),
                    "resources": provider.resource_schemas().await,
                }),
            };
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
        Commands::Version => {
            println!("oxide-provider {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
