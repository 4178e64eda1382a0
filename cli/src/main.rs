mod command;
mod config;
mod trace;

use clap::{Parser, Subcommand};
use config::ConfigLoad;
use std::path::PathBuf;

const BANNER: &str = r#"
 _           _ _
| |___  ____| | |__
| __\ \/ / _` | '_ \
| |_ >  < (_| | |_) |
 \__/_/\_\__,_|_.__/   bitemporal, content-addressed document store
"#;

#[derive(Parser)]
#[command(name = "txdb", version, about = "A bitemporal, content-addressed document database")]
struct Args {
    /// Override the configured data directory for this invocation.
    #[arg(long, global = true, env = "TXDB_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a transaction: a JSON array of put/evict ops.
    Submit {
        /// Inline JSON, or a path to a file containing it.
        ops: String,
    },
    /// Look up an entity's value as of a business/transaction time.
    EntityAsOf {
        entity: String,
        #[arg(long)]
        bt: Option<i64>,
        #[arg(long)]
        tt: Option<i64>,
    },
    /// List every recorded version of an entity, newest first.
    History { entity: String },
    /// Scan an attribute's index for values in a range.
    ScanAttribute { attr: String, lower: String, upper: String },
    /// Show raw tx-log records at or after an offset.
    TxLog {
        #[arg(long, default_value_t = 0)]
        from_offset: i64,
    },
    /// Run the indexer loop in the foreground until interrupted.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    human_panic::setup_panic!();
    let args = Args::parse();

    let mut cfg = ConfigLoad::load().unwrap_or_default();
    cfg.inject_cmd(args.data_dir.clone(), args.verbose);

    let data_dir = cfg.resolve_data_dir();
    trace::init_logging(&data_dir, cfg.verbose)?;

    if matches!(args.command, Command::Serve) {
        println!("{}", BANNER.trim_end());
        let mut shutdown = Box::pin(tokio::signal::ctrl_c());
        tokio::select! {
            result = command::serve(&data_dir) => return result,
            _ = &mut shutdown => {
                log::info!("shutting down");
                return Ok(());
            }
        }
    }

    match args.command {
        Command::Submit { ops } => {
            let payload = if std::path::Path::new(&ops).is_file() { std::fs::read_to_string(&ops)? } else { ops };
            command::submit(&data_dir, &payload).await
        }
        Command::EntityAsOf { entity, bt, tt } => command::entity_as_of(&data_dir, &entity, bt, tt).await,
        Command::History { entity } => command::history(&data_dir, &entity).await,
        Command::ScanAttribute { attr, lower, upper } => command::scan_attribute(&data_dir, &attr, &lower, &upper).await,
        Command::TxLog { from_offset } => command::tx_log(&data_dir, from_offset).await,
        Command::Serve => unreachable!("handled above"),
    }
}
