use anyhow::{Context, Result, bail};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use storefront::catalog::links::{is_plausible_download_link, is_plausible_image_url};
use storefront::catalog::{CatalogClient, CatalogEntry, UserRecord, can_download_vip};
use storefront::cli::{Args, Command};
use storefront::config::Config;
use storefront::logging::setup_logging;
use storefront::refresh::{Origin, RefreshScheduler, SessionState, UserSlot};
use storefront::store::KvStore;
use storefront::view::{self, CategoryLabels, Selection, View};
use tracing::{error, info, warn};
use yansi::Paint;

/// How long a one-shot command waits for a background revalidation.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Config comes first so logging can honor its level
    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            return ExitCode::FAILURE;
        }
    };
    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT_SHORT"),
        environment = if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        },
        endpoint = %config.endpoint,
        "starting storefront"
    );

    match run(config, args.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "command failed");
            eprintln!("{} {e:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

struct Session {
    config: Config,
    store: Arc<dyn KvStore>,
    scheduler: RefreshScheduler,
}

impl Session {
    fn open(config: Config) -> Result<Self> {
        let client = CatalogClient::new(config.endpoint.clone(), config.fetch_timeout())
            .context("Failed to build catalog client")?;
        let store = config.open_store();
        let scheduler = RefreshScheduler::builder(
            Arc::new(client),
            config.catalog_cache(store.clone()),
            config.cache_policy(),
        )
        .with_user_slot(UserSlot {
            store: store.clone(),
            key: config.user_key.clone(),
        })
        .with_poll_interval(config.auto_refresh_interval())
        .with_projector(config.projector())
        .build();

        Ok(Self {
            config,
            store,
            scheduler,
        })
    }

    /// Load the catalog, failing only when nothing at all could be shown.
    async fn load(&self) -> Result<SessionState> {
        let state = self.scheduler.start().await;
        if state.is_failed() {
            match &state.error {
                Some(e) => bail!("Catalog unavailable: {e}"),
                None => bail!("Catalog unavailable"),
            }
        }
        if let Some(catalog) = &state.catalog
            && catalog.origin == Origin::Cache
            && let Some(e) = &state.error
        {
            warn!(error = %e, "Showing cached catalog, network fetch failed");
        }
        Ok(state)
    }

    async fn stored_user(&self) -> Option<UserRecord> {
        let raw = self.store.get(&self.config.user_key).await.ok()??;
        serde_json::from_str(&raw).ok()
    }

    fn labels(&self) -> &CategoryLabels {
        &self.config.category_labels
    }
}

async fn run(config: Config, command: Command) -> Result<()> {
    let session = Session::open(config)?;

    match command {
        Command::List {
            view,
            category,
            search,
        } => {
            session.load().await?;
            let selection = Selection::view(View::from(view))
                .with_category(category)
                .with_search(search);
            print_listing(&session, &selection);
        }
        Command::Featured => {
            let state = session.load().await?;
            let featured = state
                .catalog
                .as_ref()
                .map(|c| c.featured.clone())
                .unwrap_or_default();
            println!("{}", "Nổi bật".bold());
            for entry in &featured {
                print_card(entry, session.labels());
            }
        }
        Command::Show { id } => {
            let state = session.load().await?;
            let catalog = state.catalog.context("Catalog not loaded")?;
            let Some(entry) = view::find_by_id(catalog.entries(), &id) else {
                bail!("No entry with id {id}");
            };
            let user = session.stored_user().await;
            print_detail(entry, session.labels(), user.as_ref());
        }
        Command::Refresh => {
            let catalog = session
                .scheduler
                .refresh()
                .await
                .map_err(|e| anyhow::anyhow!("Refresh failed: {e}"))?;
            if let Some(e) = session.scheduler.state().error {
                bail!("Refresh failed, cache left untouched: {e}");
            }
            println!(
                "{} {} entries cached",
                "refreshed".green().bold(),
                catalog.snapshot.len()
            );
        }
        Command::Watch { email } => {
            session.load().await?;
            session.scheduler.start_auto_refresh(&email);
            println!(
                "{} {} (Ctrl-C to stop)",
                "watching".cyan().bold(),
                email.trim()
            );
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            info!("Interrupt received, stopping");
        }
        Command::ClearCache => {
            session.scheduler.cache().clear().await?;
            println!("{}", "cache cleared".green().bold());
        }
    }

    session.scheduler.settle(SETTLE_TIMEOUT).await;
    session.scheduler.shutdown().await;
    Ok(())
}

fn print_listing(session: &Session, selection: &Selection) {
    let labels = session.labels();
    let entries = session.scheduler.project(selection);

    println!("{}", labels.section_title(selection).bold());
    if entries.is_empty() {
        let today = session.config.projector().today();
        println!("  {}", view::empty_state_message(selection, today).dim());
    }
    for entry in &entries {
        print_card(entry, labels);
    }

    if let Some(games) = session.scheduler.games_rail(selection) {
        println!();
        println!("{}", labels.label("game").bold());
        for entry in &games {
            print_card(entry, labels);
        }
    }
}

fn category_line(entry: &CatalogEntry, labels: &CategoryLabels) -> String {
    entry
        .category_tags()
        .map(|tag| labels.label(tag))
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_card(entry: &CatalogEntry, labels: &CategoryLabels) {
    println!(
        "  {:>5}  {}  {}",
        entry.id.dim(),
        entry.name.bold(),
        category_line(entry, labels).cyan()
    );
    for line in entry.feature_lines().take(2) {
        println!("         - {line}");
    }
}

fn print_detail(entry: &CatalogEntry, labels: &CategoryLabels, user: Option<&UserRecord>) {
    println!("{} {}", entry.name.bold(), format!("#{}", entry.id).dim());
    println!("  {}", category_line(entry, labels).cyan());
    println!("  share id   {}", view::seo_slug(&entry.id, &entry.name));
    if let Some(updated) = entry.updated_on() {
        println!("  updated {}", updated.format("%d/%m/%Y"));
    }

    for line in entry.feature_lines() {
        println!("  - {line}");
    }

    if let Some(image) = entry.image.as_deref().filter(|u| is_plausible_image_url(u)) {
        println!("  icon       {image}");
    }
    for (i, shot) in entry.screenshots().iter().enumerate() {
        println!("  screenshot {} {shot}", i + 1);
    }

    match entry
        .download_link
        .as_deref()
        .filter(|u| is_plausible_download_link(u))
    {
        Some(link) => println!("  {} {link}", "download".green()),
        None => println!("  {}", "download unavailable".dim()),
    }

    if let Some(vip) = entry
        .vip_link
        .as_deref()
        .filter(|u| is_plausible_download_link(u))
    {
        let package = user.and_then(|u| u.package_type.as_deref());
        if can_download_vip(entry.vip_permissions.as_deref(), package) {
            println!("  {} {vip}", "vip".yellow());
        } else {
            println!("  {}", "vip link requires a paid package".dim());
        }
    }
}
