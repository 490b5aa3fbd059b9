use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::bail;

use clap::{Args, Parser, Subcommand};
use itertools::Itertools as _;
use rudis_migrate::{
    Pipeline, ProcessingState, Stage,
    asset::{AssetLoader, sync_with_media_library},
    checkpoint,
    client::{
        DocumentPayload,
        http::{AssetClient, MigrationClient},
        local::{LocalMediaLibrary, LocalMigrationRelease},
    },
    config::ApiOpts,
    document::{
        AlternateLanguages, SyncOptions, assign_alternate_languages, find_documents,
        sync_with_migration_release,
    },
};
use tracing::{error, info};

#[derive(Parser)]
#[command(version, about = "Migrate content into a headless CMS")]
struct Opts {
    #[command(subcommand)]
    command: Command,
    #[command(flatten)]
    io: StateIo,
    #[command(flatten)]
    api: ApiOpts,
}

#[derive(Args)]
struct StateIo {
    /// Checkpoint to start from.
    #[arg(long, env = "MIGRATE_STATE")]
    state: PathBuf,
    /// Where to write the resulting checkpoint. Defaults to `--state`,
    /// except for dry runs, which write nothing unless given `--out`.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Send nothing; write APIs are replaced by in-memory ones.
    #[arg(long)]
    dry_run: bool,
}

impl StateIo {
    /// Checkpoint to dump the result to. A dry run hands out ids that do
    /// not exist remotely, so it never writes over its input.
    fn target(&self) -> anyhow::Result<Option<PathBuf>> {
        match (&self.out, self.dry_run) {
            (Some(out), true) if same_file(out, &self.state) => {
                bail!("--out must differ from --state for a dry run")
            }
            (Some(out), _) => Ok(Some(out.clone())),
            (None, true) => Ok(None),
            (None, false) => Ok(Some(self.state.clone())),
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    a == b || matches!((a.canonicalize(), b.canonicalize()), (Ok(a), Ok(b)) if a == b)
}

#[derive(Subcommand)]
enum Command {
    /// Start a checkpoint from the files matching a glob.
    Find { pattern: String },
    /// Create or update documents in the migration release.
    Sync {
        #[arg(long)]
        skip_fields: bool,
        /// Only sync documents in these languages.
        #[arg(long = "lang")]
        languages: Vec<String>,
    },
    /// Upload assets that have no remote id yet.
    UploadAssets,
    /// Link documents to their main language version.
    LinkLanguages {
        #[arg(long)]
        main_language: String,
    },
}

fn sync_stage(opts: &Opts, state: &ProcessingState, options: SyncOptions) -> anyhow::Result<Stage> {
    if opts.io.dry_run {
        let existing = state.documents().iter().filter_map(|document| {
            let id = document.id.clone()?;
            Some((id, DocumentPayload::from_document(document, false)))
        });
        return Ok(sync_with_migration_release(
            Arc::new(LocalMigrationRelease::with_existing(existing)),
            options,
        ));
    }
    let client = MigrationClient::new(&opts.api.migration_config()?, opts.api.request_policy())?;
    Ok(sync_with_migration_release(Arc::new(client), options))
}

fn upload_stage(opts: &Opts) -> anyhow::Result<Stage> {
    if opts.io.dry_run {
        return Ok(sync_with_media_library(
            Arc::new(LocalMediaLibrary::new()),
            AssetLoader::default(),
        ));
    }
    let client = AssetClient::new(&opts.api.asset_config()?, opts.api.request_policy())?;
    Ok(sync_with_media_library(Arc::new(client), AssetLoader::default()))
}

async fn run(opts: Opts) -> anyhow::Result<()> {
    let state = match &opts.command {
        Command::Find { pattern } => find_documents(pattern)?,
        _ => checkpoint::read(&opts.io.state).await?,
    };
    let stage = match &opts.command {
        Command::Find { .. } => Stage::new("find", |state| async move { Ok(state) }),
        Command::Sync {
            skip_fields,
            languages,
        } => {
            let mut options = SyncOptions::default();
            if *skip_fields {
                options = options.without_fields();
            }
            if !languages.is_empty() {
                options = options.only_languages(languages.iter().cloned());
            }
            sync_stage(&opts, &state, options)?
        }
        Command::UploadAssets => upload_stage(&opts)?,
        Command::LinkLanguages { main_language } => {
            assign_alternate_languages(AlternateLanguages::new(main_language.as_str()))
        }
    };
    let mut pipeline = Pipeline::new().then(stage);
    match opts.io.target()? {
        Some(out) => pipeline = pipeline.then(checkpoint::dump(out)),
        None => info!("dry run without --out, checkpoint is not written"),
    }
    let state = pipeline.run(state).await?;

    let languages = state
        .documents()
        .iter()
        .map(|document| document.lang.as_deref().unwrap_or("-"))
        .counts();
    for (lang, documents) in languages.into_iter().sorted() {
        let synced = state
            .documents()
            .iter()
            .filter(|document| {
                document.lang.as_deref().unwrap_or("-") == lang && document.id.is_some()
            })
            .count();
        info!(lang, documents, synced, "summary");
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let opts = Opts::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    if let Err(error) = run(opts).await {
        error!(?error, "migration failed");
        std::process::exit(1);
    }
}
