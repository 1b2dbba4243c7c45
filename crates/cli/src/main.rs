use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use crawler_core::application::{CrawlRequest, CrawlService, RunError, RunOutcome};
use crawler_core::cancel::CancelFlag;
use crawler_core::config::{record_table_path, Credentials, CrawlerConfig};
use crawler_core::domain::Checkpoint;
use crawler_core::ports::{BrowserDriver, PostListStore, RecordRepository};
use crawler_core::probe::check_selectors;
use crawler_core::store::RecordStore;
use post_list_adapter::PostListFile;
use signal_hook::consts::{SIGINT, SIGTERM};
use sqlite_adapter::SqliteRecordRepository;
use tracing_subscriber::EnvFilter;
use webdriver_adapter::WebDriverSession;

/// Crawls an account's posts, their comments and replies into a SQLite table
#[derive(Parser, Debug)]
#[command(name = "thread-crawler")]
#[command(about = "Crawls posts, comments and replies of an account into tabular records")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// WebDriver server (geckodriver) to start the browser session on
    #[arg(long, global = true, default_value = "http://localhost:4444")]
    webdriver_url: String,

    /// Run the browser without a visible window
    #[arg(long, global = true)]
    headless: bool,

    /// TOML file overriding timing and selectors
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, env = "INSTAGRAM_USERNAME", hide_env_values = true)]
    username: Option<String>,

    #[arg(long, global = true, env = "INSTAGRAM_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enumerate the account's posts (unless a list is given) and crawl them
    Crawl(CrawlArgs),

    /// Probe every configured selector against a prepared test account
    CheckSelectors {
        #[arg(long)]
        test_account: String,
    },
}

#[derive(Args, Debug)]
struct CrawlArgs {
    /// The account to crawl
    #[arg(long = "account-name")]
    account_name: String,

    /// Existing post url list; skips enumeration
    #[arg(long)]
    posts: Option<PathBuf>,

    /// Stop after writing the post url list
    #[arg(long = "only-get-post-urls")]
    only_get_post_urls: bool,

    /// Start crawling at the post after this url in the list
    #[arg(long = "from-post-url")]
    from_post_url: Option<String>,

    /// Where post lists and record tables are written
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
}

fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Err(e) = init_tracing() {
        eprintln!("Error initialising logging: {e:#}");
        std::process::exit(1);
    }

    let result = match &cli.command {
        Command::Crawl(args) => crawl(&cli, args),
        Command::CheckSelectors { test_account } => selector_check(&cli, test_account),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("crawler_core=info".parse()?)
                .add_directive("sqlite_adapter=info".parse()?)
                .add_directive("post_list_adapter=info".parse()?)
                .add_directive("webdriver_adapter=info".parse()?),
        )
        .init();
    Ok(())
}

/// First signal sets the cancel flag; a second one terminates the process.
fn install_interrupt_handler(cancel: &CancelFlag) -> anyhow::Result<()> {
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register_conditional_shutdown(signal, 1, cancel.shared())
            .context("registering shutdown handler")?;
        signal_hook::flag::register(signal, cancel.shared()).context("registering interrupt handler")?;
    }
    Ok(())
}

fn credentials(cli: &Cli) -> Option<Credentials> {
    Credentials::from_parts(cli.username.clone(), cli.password.clone())
}

fn connect(cli: &Cli) -> anyhow::Result<WebDriverSession> {
    WebDriverSession::connect(&cli.webdriver_url, cli.headless)
        .with_context(|| format!("starting browser session on {}", cli.webdriver_url))
}

fn crawl(cli: &Cli, args: &CrawlArgs) -> anyhow::Result<bool> {
    let request = CrawlRequest {
        account: args.account_name.clone(),
        post_list: args.posts.clone(),
        only_enumerate: args.only_get_post_urls,
        resume_from: args.from_post_url.clone(),
    };
    // Instantiate concrete implementations of secondary adapters
    let post_lists: Box<dyn PostListStore> = Box::new(PostListFile::new());
    request.check_post_list(post_lists.as_ref())?;

    let config = CrawlerConfig::load(cli.config.as_deref())?;
    let cancel = CancelFlag::new();
    install_interrupt_handler(&cancel)?;

    let repository: Box<dyn RecordRepository> = Box::new(SqliteRecordRepository::new(
        record_table_path(&args.data_dir, &args.account_name),
    ));
    let store = RecordStore::open(repository).context("opening record table")?;
    let driver: Box<dyn BrowserDriver> = Box::new(connect(cli)?);

    let service = CrawlService::new(driver, store, post_lists, config, cancel, &args.data_dir)
        .with_credentials(credentials(cli));

    match service.run(&request) {
        Ok(RunOutcome::Enumerated { posts, post_list }) => {
            println!("Saved {posts} post url(s) to {}", post_list.display());
            Ok(true)
        }
        Ok(RunOutcome::Crawled {
            posts,
            skipped,
            post_list,
        }) => {
            println!("Crawled {posts} post(s) from {}", post_list.display());
            if skipped > 0 {
                println!("Skipped {skipped} post(s) already in the record table");
            }
            Ok(true)
        }
        Err(RunError::Aborted(failure)) => {
            eprintln!("Error: {failure:#}");
            print_checkpoint(&failure.post_list, &failure.checkpoint);
            Ok(false)
        }
        Err(RunError::Setup(e)) => Err(e.into()),
    }
}

fn print_checkpoint(post_list: &Path, checkpoint: &Checkpoint) {
    let list = post_list.display();
    eprintln!("********************************");
    match &checkpoint.last_completed {
        Some(last) => eprintln!(
            "Use the arguments:\n  --posts {list} --from-post-url {last}\nto retry crawling starting from the same post."
        ),
        None => eprintln!(
            "Use the arguments:\n  --posts {list}\nto retry crawling from the first post."
        ),
    }
    eprintln!("********************************");
    eprintln!(
        "Use the arguments:\n  --posts {list} --from-post-url {}\nto retry and skip the current post.",
        checkpoint.in_progress
    );
}

fn selector_check(cli: &Cli, test_account: &str) -> anyhow::Result<bool> {
    let config = CrawlerConfig::load(cli.config.as_deref())?;
    let driver = connect(cli)?;
    let credentials = credentials(cli);

    let report = check_selectors(&driver, &config, credentials.as_ref(), test_account);
    if let Err(e) = driver.quit() {
        tracing::warn!(error = %e, "browser session did not shut down cleanly");
    }
    let report = report?;

    for check in &report.checks {
        let detail = check.detail.as_deref().unwrap_or("");
        let optional = if check.required { "" } else { " (optional)" };
        println!("{:<8} {}{optional} {detail}", check.status, check.name);
    }
    let failed = report.failures().count();
    if failed == 0 {
        println!("All required selectors matched.");
    } else {
        println!("{failed} required selector(s) did not match.");
    }
    Ok(report.passed())
}
