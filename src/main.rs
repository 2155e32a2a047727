use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

mod batch;
mod calculator;
mod config;
mod estimator;
mod models;
mod report;
mod store;
mod theme;
mod viewport;

use calculator::{Calculator, FormField, View};
use config::{AppConfig, StoreBackend};
use models::Metric;
use store::{FileStore, KeyValueStore, MemoryStore, PgStore};
use theme::{Palette, ThemeContext};
use viewport::TerminalViewport;

#[derive(Parser)]
#[command(name = "belonging-calculator")]
#[command(about = "Projects school belonging metrics across 6, 12 and 18 months", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the Postgres storage schema
    InitDb,
    /// Project one scenario and remember it as the last result
    Calculate {
        #[arg(long)]
        school_name: Option<String>,
        #[arg(long)]
        student_count: Option<String>,
        #[arg(long)]
        belonging: Option<String>,
        #[arg(long)]
        voice: Option<String>,
        #[arg(long)]
        safety: Option<String>,
        #[arg(long)]
        engagement: Option<String>,
        /// Also write the full roadmap as markdown
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Drive the calculator interactively from stdin
    Session,
    /// Show the last remembered result
    Last,
    /// Inspect or change the color theme
    Theme {
        #[command(subcommand)]
        action: ThemeAction,
    },
    /// Project every scenario in a CSV file
    Batch {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value = "projections.csv")]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum ThemeAction {
    Show,
    Toggle,
    /// Follow the operating system's dark-mode setting
    #[command(group(
        ArgGroup::new("appearance")
            .args(["dark", "light"])
            .required(true)
            .multiple(false)
    ))]
    System {
        #[arg(long)]
        dark: bool,
        #[arg(long)]
        light: bool,
    },
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    match config.store {
        StoreBackend::File => {
            tracing::debug!(path = %config.store_path.display(), "using file storage");
            Ok(Arc::new(FileStore::new(&config.store_path)))
        }
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Postgres => Ok(Arc::new(connect_postgres(config).await?)),
    }
}

async fn connect_postgres(config: &AppConfig) -> anyhow::Result<PgStore> {
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set when CALCULATOR_STORE=postgres")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(PgStore::new(pool))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let cli = Cli::parse();
    let config = AppConfig::from_env();

    match cli.command {
        Commands::InitDb => {
            if config.store != StoreBackend::Postgres {
                anyhow::bail!("init-db needs CALCULATOR_STORE=postgres");
            }
            connect_postgres(&config).await?.init_db().await?;
            println!("Schema ready.");
        }
        Commands::Calculate {
            school_name,
            student_count,
            belonging,
            voice,
            safety,
            engagement,
            out,
        } => {
            let store = open_store(&config).await?;
            let theme = ThemeContext::load(store.clone()).await;
            let mut calculator = Calculator::new(store);

            let edits = [
                (FormField::SchoolName, school_name),
                (FormField::StudentCount, student_count),
                (FormField::Metric(Metric::Belonging), belonging),
                (FormField::Metric(Metric::Voice), voice),
                (FormField::Metric(Metric::Safety), safety),
                (FormField::Metric(Metric::Engagement), engagement),
            ];
            for (field, value) in edits {
                if let Some(value) = value {
                    calculator.edit(field, &value);
                }
            }

            let bundle = calculator
                .submit()
                .await
                .context("calculator did not produce a result")?;
            print!("{}", report::render_summary(bundle, &theme.current().palette()));

            if let Some(out) = out {
                std::fs::write(&out, report::build_report(bundle))
                    .with_context(|| format!("failed to write {}", out.display()))?;
                println!("Report written to {}.", out.display());
            }
        }
        Commands::Session => {
            let store = open_store(&config).await?;
            let theme = ThemeContext::load(store.clone()).await;
            let viewport = Arc::new(TerminalViewport::new(theme.subscribe()));
            let calculator = Calculator::new(store).with_viewport(viewport, config.scroll_delay);
            run_session(calculator, &theme).await?;
        }
        Commands::Last => {
            let store = open_store(&config).await?;
            let theme = ThemeContext::load(store.clone()).await;
            match store::load_last_result(store.as_ref()).await? {
                Some(bundle) => {
                    println!("Last computed {}", bundle.computed_at.to_rfc3339());
                    print!("{}", report::render_summary(&bundle, &theme.current().palette()));
                }
                None => println!("No saved result yet."),
            }
        }
        Commands::Theme { action } => {
            let store = open_store(&config).await?;
            let theme = ThemeContext::load(store).await;
            let current = match action {
                ThemeAction::Show => theme.current(),
                ThemeAction::Toggle => theme.toggle().await,
                ThemeAction::System { dark, .. } => theme.apply_system_preference(dark).await,
            };
            println!("Theme: {current}");
        }
        Commands::Batch { csv, out } => {
            let input = std::fs::File::open(&csv)
                .with_context(|| format!("failed to open {}", csv.display()))?;
            let output = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            let scenarios = batch::project_csv(input, output)?;
            println!("Projected {scenarios} scenarios into {}.", out.display());
        }
    }

    Ok(())
}

const SESSION_HELP: &str = "commands: set <field> <value> | submit | clear | again | show | theme | quit\n\
fields: school, students, belonging, voice, safety, engagement";

async fn run_session(mut calculator: Calculator, theme: &ThemeContext) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    stdout.write_all(format!("{SESSION_HELP}\n").as_bytes()).await?;
    stdout
        .write_all(describe_form(&calculator, &theme.current().palette()).as_bytes())
        .await?;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));

        let reply = match command {
            "" => continue,
            "quit" | "exit" => break,
            "help" => SESSION_HELP.to_string(),
            "show" => describe_form(&calculator, &theme.current().palette()),
            "set" => {
                let (name, value) = rest.trim().split_once(' ').unwrap_or((rest.trim(), ""));
                match FormField::from_name(name) {
                    Some(field) => {
                        if calculator.edit(field, value.trim()) {
                            describe_form(&calculator, &theme.current().palette())
                        } else {
                            "Results are showing; use `again` to edit a new scenario.".to_string()
                        }
                    }
                    None => format!("Unknown field {name:?}."),
                }
            }
            "submit" => match calculator.submit().await {
                Some(bundle) => report::render_summary(bundle, &theme.current().palette()),
                None => "Already showing results; use `again` first.".to_string(),
            },
            "theme" => format!("Theme: {}", theme.toggle().await),
            "clear" => {
                calculator.clear_form();
                describe_form(&calculator, &theme.current().palette())
            }
            "again" => {
                calculator.try_another();
                describe_form(&calculator, &theme.current().palette())
            }
            other => format!("Unknown command {other:?}. {SESSION_HELP}"),
        };

        stdout.write_all(format!("{}\n", reply.trim_end()).as_bytes()).await?;
        stdout.flush().await?;
    }

    Ok(())
}

/// Whatever the current view shows: the results summary, or the form.
fn describe_form(calculator: &Calculator, palette: &Palette) -> String {
    if calculator.view() == View::Results {
        if let Some(bundle) = calculator.result() {
            return report::render_summary(bundle, palette);
        }
    }

    let form = calculator.form();
    let mut text = format!(
        "School Name: {}\nStudent Count: {}\n",
        form.school_name, form.student_count
    );
    for metric in Metric::ALL {
        let (label, description) = metric.form_label();
        text.push_str(&format!(
            "{label}: {} / 100 ({description})\n",
            form.metrics.get(metric)
        ));
    }
    text
}
