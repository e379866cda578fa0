use std::path::PathBuf;

use clap::{Arg, ArgAction, Command};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cartflow::flows::{CartFlow, Credentials, FlowReport, LoginFlow, RunContext, SearchFlow};
use cartflow::session::{ChromeDriver, Driver, TabTracker};
use cartflow::{testdata, FlowConfig, FlowVerdict};

fn cli() -> Command {
    Command::new("cartflow")
        .about("Browser-driven login and search/add-to-cart test flows")
        .subcommand_required(true)
        .arg(
            Arg::new("headless")
                .long("headless")
                .action(ArgAction::SetTrue)
                .help("Run the browser without a visible window"),
        )
        .arg(
            Arg::new("keyword")
                .long("keyword")
                .help("Search keyword, overriding the keyword file"),
        )
        .arg(
            Arg::new("keyword-file")
                .long("keyword-file")
                .default_value("testdata/keyword.json")
                .help("File holding the search keyword"),
        )
        .arg(
            Arg::new("artifacts")
                .long("artifacts")
                .default_value("artifacts")
                .help("Directory for failure screenshots and page sources"),
        )
        .subcommand(
            Command::new("login")
                .about("Sign in and verify the signed-in state")
                .arg(Arg::new("email").long("email").env("CARTFLOW_EMAIL").required(true))
                .arg(
                    Arg::new("password")
                        .long("password")
                        .env("CARTFLOW_PASSWORD")
                        .required(true),
                ),
        )
        .subcommand(Command::new("search").about("Search and add one matching product to the cart"))
        .subcommand(Command::new("cart").about("Remove the newest item from the cart"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let matches = cli().get_matches();

    let mut config = FlowConfig::default();
    config.browser.headless = matches.get_flag("headless");

    let keyword = match matches.get_one::<String>("keyword") {
        Some(keyword) => keyword.clone(),
        None => {
            let path = PathBuf::from(matches.get_one::<String>("keyword-file").unwrap());
            match testdata::load_search_keyword(&path) {
                Ok(keyword) => keyword,
                // Sign-in does not search; a missing keyword file should not
                // block it.
                Err(_) if matches.subcommand_name() == Some("login") => String::new(),
                Err(e) => return Err(e.into()),
            }
        }
    };
    let artifacts_dir = PathBuf::from(matches.get_one::<String>("artifacts").unwrap());

    info!(%keyword, headless = config.browser.headless, "launching browser");
    let driver = ChromeDriver::launch(&config.browser)?;
    let original = driver.open_tab().await?;
    let mut ctx = RunContext::new(&keyword);

    let verdict = match matches.subcommand() {
        Some(("login", sub)) => {
            let credentials = Credentials {
                email: sub.get_one::<String>("email").unwrap().clone(),
                password: sub.get_one::<String>("password").unwrap().clone(),
            };
            let flow = LoginFlow::new(&driver, &config);
            flow.run(&original, &mut ctx, &credentials).await
        }
        Some(("search", _)) => {
            let mut tracker = TabTracker::new(&driver, original.clone());
            let flow = SearchFlow::new(&driver, &config);
            flow.run(&mut tracker, &mut ctx).await
        }
        Some(("cart", _)) => {
            let mut tracker = TabTracker::new(&driver, original.clone());
            let flow = CartFlow::new(&driver, &config);
            flow.run(&mut tracker, &mut ctx).await
        }
        _ => unreachable!("subcommand is required"),
    };

    let completed = verdict.is_completed();
    let report: FlowReport = ctx.into_report(verdict);

    for evidence in &report.artifacts {
        if let Err(e) = evidence.persist(&artifacts_dir) {
            error!(label = %evidence.label, error = %e, "could not persist artifact");
        }
    }
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !completed {
        match &report.verdict {
            FlowVerdict::Failed { reason } => error!(%reason, "run failed"),
            FlowVerdict::Aborted { reason } => error!(%reason, "run aborted"),
            FlowVerdict::Completed => {}
        }
        std::process::exit(1);
    }
    Ok(())
}
