// Replay a recorded host-page fixture through the dashboard engine

#[cfg(not(target_arch = "wasm32"))]
mod harness {
    use std::path::PathBuf;

    use alliance_dashboard_player::core::replay::{run_replay, ReplayFixture};
    use alliance_dashboard_player::core::{Config, UserscriptManifest};
    use alliance_dashboard_player::logging::init_logging;
    use anyhow::{Context, Result};
    use clap::Parser;
    use tracing::info;

    #[derive(Parser, Debug)]
    #[command(author, version, about = "Replay recorded alliance pages through the overlay engine", long_about = None)]
    struct Cli {
        /// Fixture with the timeline of host states (JSON)
        fixture: Option<PathBuf>,
        /// Settings file; defaults to ./dashboard.toml, then the embedded copy
        #[arg(long, short)]
        config: Option<PathBuf>,
        /// Print the userscript header and exit
        #[arg(long)]
        manifest: bool,
        /// Print only the final overlay markup
        #[arg(long)]
        html_only: bool,
    }

    pub fn run() -> Result<()> {
        let cli = Cli::parse();

        // Explicit path, then dashboard.toml in the working directory, then the embedded copy
        let config_path = cli.config.clone().or_else(|| {
            let local = PathBuf::from(Config::CONFIG_FILENAME);
            local.exists().then_some(local)
        });
        let config = match &config_path {
            Some(path) => Config::load(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => Config::embedded().context("embedded config is invalid")?,
        };

        if cli.manifest {
            print!("{}", UserscriptManifest::current(&config.packaging).header());
            return Ok(());
        }

        init_logging(&config.logging);

        let path = cli
            .fixture
            .context("a fixture path is required unless --manifest is given")?;
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        let fixture = ReplayFixture::from_json(&json)
            .with_context(|| format!("parsing fixture {}", path.display()))?;

        info!(fixture = %path.display(), frames = fixture.frames.len(), "[REPLAY] Starting");
        let report = run_replay(&fixture, &config)?;

        if !cli.html_only {
            for timed in &report.events {
                println!("{:>8} ms  {:?}", timed.at_ms, timed.event);
            }
            match &report.snapshot {
                Some(snapshot) => println!(
                    "\nsnapshot v{}:\n{}",
                    snapshot.version(),
                    serde_json::to_string_pretty(snapshot.as_ref())?
                ),
                None => println!("\nno snapshot published"),
            }
            println!();
        }
        match &report.html {
            Some(html) => println!("{html}"),
            None => println!("<!-- overlay never mounted -->"),
        }
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    harness::run()
}

#[cfg(target_arch = "wasm32")]
fn main() {}
