use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use commentsweep::{
    CommentRecord, CommentWorkspace, DeletionGateway, DryRunGateway, HttpDeletionGateway,
    InMemoryRecordStore, ItemStatus, LocalQuotaAuthority, NumericRange, QuerySpec, QuotaAuthority,
    QuotaLedger, QuotaUsage, QuotaUsageFile, RecordStore, SearchScope, SortDirection, SortField,
    StaticCredential, SweepConfig, WindowedQueryEngine,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, event};

#[derive(Parser)]
#[command(name = "commentsweep")]
#[command(about = "Browse and bulk-delete a comment history within the daily API quota")]
pub struct Cli {
    /// Directory holding the record snapshot and journal
    #[arg(long, global = true, default_value = ".commentsweep")]
    data_dir: PathBuf,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load records from a JSON array file
    Import { file: PathBuf },
    /// Count records matching the filters
    Count {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Print a page of matching records
    List {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Show the local quota budget
    Quota {
        /// Units already spent today, overriding the saved usage
        #[arg(long)]
        used: Option<u64>,
    },
    /// Delete every matching record, within the remaining budget
    Sweep {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        limit: Option<usize>,
        /// Units already spent today, overriding the saved usage
        #[arg(long)]
        used: Option<u64>,
        /// Run the session without touching the remote API or the store
        #[arg(long)]
        dry_run: bool,
        #[arg(long, env = "COMMENTSWEEP_API_BASE")]
        api_base: Option<String>,
        #[arg(long, env = "COMMENTSWEEP_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
}

#[derive(Args, Clone, Default)]
struct FilterArgs {
    #[arg(long)]
    min_chars: Option<u64>,
    #[arg(long)]
    max_chars: Option<u64>,
    #[arg(long)]
    min_likes: Option<u64>,
    #[arg(long)]
    max_likes: Option<u64>,
    /// Require a label; repeatable
    #[arg(long = "label")]
    labels: Vec<String>,
    #[arg(long)]
    channel: Option<String>,
    /// Words to match; `*` is a wildcard
    #[arg(long)]
    search: Option<String>,
    #[arg(long, value_enum, default_value_t = ScopeArg::Text)]
    scope: ScopeArg,
    #[arg(long, value_enum, default_value_t = SortArg::Published)]
    sort: SortArg,
    #[arg(long)]
    asc: bool,
}

#[derive(Clone, Copy, Default, ValueEnum)]
enum ScopeArg {
    #[default]
    Text,
    Video,
    Channel,
    All,
}

#[derive(Clone, Copy, Default, ValueEnum)]
enum SortArg {
    #[default]
    Published,
    Likes,
    Chars,
    Channel,
}

impl FilterArgs {
    fn to_spec(&self) -> QuerySpec {
        let direction = if self.asc {
            SortDirection::Ascending
        } else {
            SortDirection::Descending
        };
        let field = match self.sort {
            SortArg::Published => SortField::PublishedAt,
            SortArg::Likes => SortField::LikeCount,
            SortArg::Chars => SortField::CharCount,
            SortArg::Channel => SortField::ChannelName,
        };

        let mut spec = QuerySpec::new()
            .char_count(NumericRange::new(self.min_chars, self.max_chars))
            .like_count(NumericRange::new(self.min_likes, self.max_likes))
            .sort_by(field, direction);
        for label in &self.labels {
            spec = spec.require_label(label.clone());
        }
        if let Some(channel) = &self.channel {
            spec = spec.channel(channel.clone());
        }
        if let Some(text) = &self.search {
            let scope = match self.scope {
                ScopeArg::Text => SearchScope::CommentText,
                ScopeArg::Video => SearchScope::VideoTitle,
                ScopeArg::Channel => SearchScope::ChannelName,
                ScopeArg::All => SearchScope::All,
            };
            spec = spec.search(text.clone(), scope);
        }
        spec
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => SweepConfig::load(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => SweepConfig::default(),
    };
    config.validate()?;

    match cli.command {
        Command::Import { file } => import(&cli.data_dir, &config, &file).await,
        Command::Count { filter } => {
            let store = open_store(&cli.data_dir, &config).await?;
            println!("{}", store.count(&filter.to_spec()).await?);
            Ok(())
        }
        Command::List {
            filter,
            offset,
            limit,
            json,
        } => list(&cli.data_dir, &config, &filter, offset, limit, json).await,
        Command::Quota { used } => {
            let now = Utc::now();
            let mut ledger = QuotaLedger::new(&config.quota, now);
            if let Some(saved) = load_usage(&cli.data_dir)? {
                ledger.reconcile(saved.used, None);
                if let Some(reset_at) = saved.reset_at {
                    ledger.set_reset_at(reset_at);
                }
                ledger.roll_over_if_due(now);
            }
            if let Some(used) = used {
                ledger.reconcile(used, None);
            }
            let snapshot = ledger.snapshot();
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            println!("deletable today: {}", ledger.max_deletable());
            Ok(())
        }
        Command::Sweep {
            filter,
            limit,
            used,
            dry_run,
            api_base,
            token,
        } => {
            let gateway: Arc<dyn DeletionGateway> = if dry_run {
                Arc::new(DryRunGateway::new())
            } else {
                let base = api_base.ok_or_else(|| anyhow!("--api-base is required without --dry-run"))?;
                let token = token.ok_or_else(|| anyhow!("--token is required without --dry-run"))?;
                Arc::new(HttpDeletionGateway::new(base, StaticCredential::new(token, None)))
            };
            sweep(&cli.data_dir, &config, &filter, limit, used, dry_run, gateway).await
        }
    }
}

async fn open_store(data_dir: &Path, config: &SweepConfig) -> Result<Arc<InMemoryRecordStore>> {
    let store = InMemoryRecordStore::open(data_dir, &config.storage)
        .await
        .with_context(|| format!("Failed to open record store at '{}'", data_dir.display()))?;
    Ok(Arc::new(store))
}

fn load_usage(data_dir: &Path) -> Result<Option<QuotaUsage>> {
    let file = QuotaUsageFile::in_dir(data_dir);
    file.load()
        .with_context(|| format!("Failed to read quota usage '{}'", file.path().display()))
}

async fn import(data_dir: &Path, config: &SweepConfig, file: &Path) -> Result<()> {
    let raw = fs::read_to_string(file).with_context(|| format!("Failed to read '{}'", file.display()))?;
    let records: Vec<CommentRecord> =
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse '{}'", file.display()))?;

    let store = open_store(data_dir, config).await?;
    let written = store.upsert_many(records).await?;
    store.checkpoint().await?;
    println!("imported {} records ({} total)", written, store.len().await?);
    Ok(())
}

async fn list(
    data_dir: &Path,
    config: &SweepConfig,
    filter: &FilterArgs,
    offset: usize,
    limit: usize,
    json: bool,
) -> Result<()> {
    let store = open_store(data_dir, config).await?;
    let mut engine = WindowedQueryEngine::new(store, config.window.clone())?;
    engine.set_specification(filter.to_spec(), None).await?;

    let end = offset.saturating_add(limit).min(engine.total());
    let mut page = Vec::new();
    for index in offset..end {
        engine.report_viewport_index(index).await?;
        if let Some(record) = engine.current_window().get(index) {
            page.push(record.clone());
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }
    for record in &page {
        let text: String = record.text.chars().take(60).collect();
        println!(
            "{}\t{}\t{:>5}\t{}",
            record.id,
            record.published_at.format("%Y-%m-%d"),
            record.like_count,
            text.replace('\n', " ")
        );
    }
    println!("-- {}..{} of {}", offset.min(end), end, engine.total());
    Ok(())
}

async fn sweep(
    data_dir: &Path,
    config: &SweepConfig,
    filter: &FilterArgs,
    limit: Option<usize>,
    used: Option<u64>,
    dry_run: bool,
    gateway: Arc<dyn DeletionGateway>,
) -> Result<()> {
    let durable = open_store(data_dir, config).await?;
    let store: Arc<dyn RecordStore> = if dry_run {
        // work on a detached copy so nothing is purged
        let all = durable.query_range(&QuerySpec::default(), 0, usize::MAX).await?;
        Arc::new(InMemoryRecordStore::from_records(all))
    } else {
        Arc::clone(&durable) as Arc<dyn RecordStore>
    };

    let mut local = LocalQuotaAuthority::new(&config.quota);
    if let Some(saved) = load_usage(data_dir)? {
        local = local.restore(&saved, Utc::now());
    }
    if let Some(used) = used {
        local = local.with_used(used);
    }
    let authority = Arc::new(local);
    let shared: Arc<dyn QuotaAuthority> = authority.clone();
    let mut workspace = CommentWorkspace::new(store, gateway, shared, config)?.with_listener(Arc::new(
        |id: &str, status: &ItemStatus| {
            event!(Level::DEBUG, id, status = ?status, "item status");
        },
    ));

    workspace.set_specification(filter.to_spec(), None).await?;
    let selected = workspace.select_all_matching().await?;
    println!("selected {} records", selected);

    let handle = workspace.cancellation_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let report = workspace.delete_selected(limit).await?;
    if !dry_run {
        durable.checkpoint().await?;
        let usage = authority.current_usage().await?;
        QuotaUsageFile::in_dir(data_dir).save(&usage)?;
    }

    println!("session {} ended {}", report.session_id, report.state);
    if let Some(message) = &report.message {
        println!("{}", message);
    }
    for (id, reason) in report.failed() {
        println!("failed {}: {}", id, reason);
    }
    println!("{}", report.summary());
    Ok(())
}
