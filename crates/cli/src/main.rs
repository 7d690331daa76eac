use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ipo_core::domain::{AnalysisReport, Category, ListingRecord, Snapshot};
use ipo_core::service::IpoService;

const RULE_WIDTH: usize = 80;

#[derive(Debug, Parser)]
#[command(name = "ipo_cli", about = "Fetch mainboard IPO listings and print an analysis of each")]
struct Args {
    /// Print the listings and skip analysis.
    #[arg(long)]
    list_only: bool,

    /// Only process one category (current or upcoming).
    #[arg(long)]
    category: Option<Category>,

    /// Analyze a single listing of --category.
    #[arg(long, requires = "category")]
    index: Option<usize>,
}

impl Args {
    /// The (category, index) pairs to analyze, in run order.
    fn targets(&self, snapshot: &Snapshot) -> Vec<(Category, usize)> {
        let categories: Vec<Category> = match self.category {
            Some(category) => vec![category],
            None => Category::ALL.to_vec(),
        };

        match (self.category, self.index) {
            (Some(category), Some(index)) => vec![(category, index)],
            _ => categories
                .into_iter()
                .flat_map(|c| (0..snapshot.listings(c).len()).map(move |i| (c, i)))
                .collect(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = ipo_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let service = IpoService::from_settings(&settings)?;

    let snapshot = match service.list_ipos(false).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            let err = anyhow::Error::new(err).context("fetching IPO listings failed");
            sentry_anyhow::capture_anyhow(&err);
            return Err(err);
        }
    };

    print_listings(&snapshot, args.category);
    if args.list_only {
        return Ok(());
    }

    let targets = args.targets(&snapshot);
    let mut failed = 0usize;
    for (category, index) in &targets {
        match service.analyze_ipo(*category, *index).await {
            Ok(report) => print_report(&report),
            Err(err) => {
                failed += 1;
                tracing::warn!(%category, index, error = %err, "analysis failed");
                println!("[{} {index}] analysis failed: {err}\n", category.label());
            }
        }
    }

    tracing::info!(
        analyzed = targets.len() - failed,
        failed,
        version = snapshot.version,
        "run finished"
    );
    Ok(())
}

fn rule(ch: char) -> String {
    std::iter::repeat(ch).take(RULE_WIDTH).collect()
}

fn print_listings(snapshot: &Snapshot, only: Option<Category>) {
    println!("{}", rule('='));
    println!(
        "IPO listings fetched {} ({} current, {} upcoming)",
        snapshot.fetched_at.format("%Y-%m-%d %H:%M UTC"),
        snapshot.current.len(),
        snapshot.upcoming.len()
    );
    println!("{}", rule('='));

    for category in Category::ALL {
        if only.is_some_and(|c| c != category) {
            continue;
        }
        let listings = snapshot.listings(category);
        println!("\n{} ({})", category.label(), listings.len());
        if listings.is_empty() {
            println!("  none");
        }
        for record in listings {
            println!("  {}", listing_line(record));
        }
    }
    println!();
}

fn listing_line(record: &ListingRecord) -> String {
    let mut line = format!("{:>2}. {}", record.position, record.name);
    let dates = match (record.open_date.as_str(), record.close_date.as_str()) {
        ("", "") => String::new(),
        (open, close) => format!("{open} - {close}"),
    };
    for field in [record.price_band.as_str(), record.issue_size.as_str(), dates.as_str()] {
        if !field.is_empty() {
            line.push_str(" | ");
            line.push_str(field);
        }
    }
    line
}

fn print_report(report: &AnalysisReport) {
    let listing = &report.listing;
    println!("{}", rule('='));
    println!(
        "[{} {}] {}",
        listing.category.label(),
        listing.position,
        listing.name
    );
    println!("{}", rule('='));

    if report.sections.is_empty() {
        println!("{}\n", report.raw_analysis);
        return;
    }
    for (title, body) in report.sections.titled() {
        println!("\n{title}\n{}", rule('-'));
        if body.is_empty() {
            println!("(not provided)");
        } else {
            println!("{body}");
        }
    }
    println!();
}

fn init_sentry(settings: &ipo_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
