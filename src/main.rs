use clap::{Parser, Subcommand, ValueEnum};
use clickhouse_bridge::config::{DEFAULT_BATCH_SIZE, DEFAULT_BIND_ADDR, DEFAULT_DELIMITER};
use clickhouse_bridge::runner::{
    CoercionPolicy, ConnectionArgs, Direction, ServeArgs, TransferArgs, describe_columns,
    list_tables, read_header, run_preview, run_transfer, serve,
};
use std::path::PathBuf;

#[derive(Parser, Clone)]
#[command(version, about = "Move data between ClickHouse and delimited flat files")]
struct Args {
    /// Quiet mode - only warnings, errors and the summary
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Subcommand)]
enum Command {
    /// Serve the HTTP API
    Serve {
        /// Address to listen on
        #[arg(long, env = "BRIDGE_BIND", default_value = DEFAULT_BIND_ADDR)]
        bind: String,

        #[command(flatten)]
        run: RunOptions,
    },

    /// Transfer data in either direction
    Ingest {
        #[command(flatten)]
        transfer: TransferOptions,

        #[command(flatten)]
        run: RunOptions,
    },

    /// Show up to 100 rows from the transfer source
    Preview {
        #[command(flatten)]
        transfer: TransferOptions,

        /// Root directory for file paths
        #[arg(long, env = "BRIDGE_BASE_DIR", default_value = ".")]
        base_dir: PathBuf,
    },

    /// List tables in the database
    Tables {
        #[command(flatten)]
        connection: ConnectionOptions,
    },

    /// List the columns of a table
    Columns {
        #[command(flatten)]
        connection: ConnectionOptions,

        /// Table to describe
        #[arg(short, long)]
        table: String,
    },

    /// Print the header of a delimited file
    Header {
        /// File path relative to the base directory
        #[arg(short, long)]
        file: String,

        /// Field delimiter (single character; "\t" for tabs)
        #[arg(short, long, default_value = DEFAULT_DELIMITER)]
        delimiter: String,

        /// Root directory for file paths
        #[arg(long, env = "BRIDGE_BASE_DIR", default_value = ".")]
        base_dir: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceKind {
    /// Export ClickHouse tables to output/clickhouse_to_flatfile.csv
    Clickhouse,
    /// Import a delimited file into a ClickHouse table
    FlatFile,
}

impl From<SourceKind> for Direction {
    fn from(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Clickhouse => Direction::DatabaseToFile,
            SourceKind::FlatFile => Direction::FileToDatabase,
        }
    }
}

#[derive(Clone, clap::Args)]
struct ConnectionOptions {
    /// ClickHouse host name
    #[arg(long, env = "CLICKHOUSE_HOST")]
    host: String,

    /// ClickHouse HTTP port
    #[arg(long, env = "CLICKHOUSE_PORT", default_value = "8123")]
    port: u16,

    /// Database name
    #[arg(long, env = "CLICKHOUSE_DATABASE", default_value = "default")]
    database: String,

    /// Database user
    #[arg(long, env = "CLICKHOUSE_USER", default_value = "default")]
    user: String,

    /// Password (ignored when a JWT is given)
    #[arg(long, env = "CLICKHOUSE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// JWT sent as the access key
    #[arg(long, env = "CLICKHOUSE_JWT", hide_env_values = true)]
    jwt: Option<String>,

    /// Connect over HTTPS
    #[arg(long, env = "CLICKHOUSE_TLS")]
    tls: bool,
}

impl From<ConnectionOptions> for ConnectionArgs {
    fn from(options: ConnectionOptions) -> Self {
        ConnectionArgs {
            host: options.host,
            port: options.port,
            database: options.database,
            user: options.user,
            password: options.password,
            jwt: options.jwt,
            use_tls: options.tls,
        }
    }
}

#[derive(Clone, clap::Args)]
struct TransferOptions {
    #[command(flatten)]
    connection: ConnectionOptions,

    /// Which side records come from
    #[arg(short, long, value_enum)]
    source: SourceKind,

    /// Tables (comma separated). Exports join them; imports use the first.
    #[arg(short, long, default_value = "")]
    tables: String,

    /// Join condition, required when exporting more than one table
    #[arg(long)]
    join_condition: Option<String>,

    /// Columns to transfer (comma separated)
    #[arg(short, long)]
    columns: String,

    /// Source file for imports, relative to the base directory
    #[arg(short, long)]
    file: Option<String>,

    /// Field delimiter of the source file
    #[arg(short, long, default_value = DEFAULT_DELIMITER)]
    delimiter: String,
}

#[derive(Clone, clap::Args)]
struct RunOptions {
    /// Root directory for uploads, imports and the export file
    #[arg(long, env = "BRIDGE_BASE_DIR", default_value = ".")]
    base_dir: PathBuf,

    /// Records per batch
    #[arg(short, long, env = "BRIDGE_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// How to handle values that do not fit their column
    #[arg(long, value_enum, default_value_t = CoercionPolicy::Lenient)]
    coercion_policy: CoercionPolicy,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.quiet);

    match args.command {
        Command::Serve { bind, run } => {
            serve(ServeArgs {
                bind,
                base_dir: run.base_dir,
                batch_size: run.batch_size,
                coercion_policy: run.coercion_policy,
            })
            .await?;
        }
        Command::Ingest { transfer, run } => {
            run_ingest(transfer, run, args.quiet).await?;
        }
        Command::Preview { transfer, base_dir } => {
            let args = transfer_args(transfer, base_dir, DEFAULT_BATCH_SIZE, CoercionPolicy::default());
            for row in run_preview(args).await? {
                println!("{}", serde_json::Value::Object(row));
            }
        }
        Command::Tables { connection } => {
            for table in list_tables(&connection.into()).await? {
                println!("{}", table);
            }
        }
        Command::Columns { connection, table } => {
            let schema = describe_columns(&connection.into(), &table).await?;
            for column in &schema.columns {
                println!("{}\t{}", column.name, column.type_name);
            }
        }
        Command::Header {
            file,
            delimiter,
            base_dir,
        } => {
            for column in read_header(base_dir, &file, &delimiter).await? {
                println!("{}", column);
            }
        }
    }
    Ok(())
}

/// RUST_LOG wins over the quiet flag when set
fn init_tracing(quiet: bool) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            EnvFilter::new("clickhouse_bridge=warn,tower_http=warn")
        } else {
            EnvFilter::new("clickhouse_bridge=info,tower_http=info")
        }
    });
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn transfer_args(
    transfer: TransferOptions,
    base_dir: PathBuf,
    batch_size: usize,
    coercion_policy: CoercionPolicy,
) -> TransferArgs {
    TransferArgs {
        connection: transfer.connection.into(),
        direction: transfer.source.into(),
        tables: cli::parse_list(&transfer.tables),
        join_condition: transfer.join_condition,
        columns: cli::parse_list(&transfer.columns),
        file: transfer.file,
        delimiter: transfer.delimiter,
        base_dir,
        batch_size,
        coercion_policy,
    }
}

async fn run_ingest(transfer: TransferOptions, run: RunOptions, quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        println!("ClickHouse Bridge");
        println!("=================");
        println!("Host: {}:{}", transfer.connection.host, transfer.connection.port);
        println!("Database: {}", transfer.connection.database);
        println!("Direction: {}", Direction::from(transfer.source));
        println!("Batch size: {}", run.batch_size);
        println!();
    }

    let args = transfer_args(transfer, run.base_dir, run.batch_size, run.coercion_policy);
    let summary = run_transfer(args).await?;

    println!();
    println!("Transfer Summary");
    println!("================");
    println!("Run ID: {}", summary.run_id);
    println!("Direction: {}", summary.direction);
    println!("Records: {}", summary.record_count);
    println!("Batches: {}", summary.batches_flushed);
    println!("Coercion anomalies: {}", summary.coercion_anomalies);
    println!("Duration: {:.2}s", summary.duration.as_secs_f64());
    if summary.duration.as_secs_f64() > 0.0 {
        println!(
            "Throughput: {:.2} records/sec",
            summary.record_count as f64 / summary.duration.as_secs_f64()
        );
    }
    if let (Some(p50), Some(p90), Some(p99)) = summary.batch_latency_ms {
        println!("Batch latency: p50={}ms p90={}ms p99={}ms", p50, p90, p99);
    }
    if let Some(path) = &summary.output_path {
        println!("Output file: {}", path.display());
    }

    Ok(())
}

/// CLI utility functions for parsing command-line arguments
mod cli {
    /// Split a comma separated list, dropping blanks
    pub fn parse_list(list: &str) -> Vec<String> {
        list.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    }

}
