mod dashboard;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use bk_station::config::{self, ensure_com_defaults};
use bk_station::simulation::{self, SimulationParams};
use bk_station::{BookMode, CycleOutcome, KpiReporter, KpiSnapshot, SerialChannel, Station, StationConfig};
use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "station_cli", version, about = "Book station controller")]
struct Cli {
    #[arg(long, global = true, help = "Path to config.ini (default: next to the executable)")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Output machine-readable JSON")]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Operator loop: scan books, run a cycle per unit.
    Run {
        #[arg(long)]
        model: String,
        #[arg(long, value_enum, default_value_t = ModeArg::Two)]
        mode: ModeArg,
        #[arg(long, help = "Station UPC to cross-check against SFC")]
        upc: Option<String>,
        #[arg(long, help = "Show the KPI dashboard when the loop ends")]
        dashboard: bool,
    },
    /// Feed synthetic outcomes through the KPI counters.
    Simulate {
        #[arg(long, default_value_t = 10_000)]
        runs: u64,
        #[arg(long, default_value_t = 0.20)]
        p_human: f64,
        #[arg(long, default_value_t = 0.03)]
        p_system: f64,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        dashboard: bool,
    },
    /// Parse a device reply and print the result.
    Parse { raw: String },
    /// List serial ports on this machine.
    Ports,
    /// List configured model codes.
    Models,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    One,
    Two,
}

impl From<ModeArg> for BookMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::One => BookMode::OneBook,
            ModeArg::Two => BookMode::TwoBook,
        }
    }
}

// The main entry point for the station command-line application.
fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[ERROR] {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    match cli.command {
        Commands::Run { model, mode, upc, dashboard } => {
            ensure_com_defaults(&config_path).context("preparing config")?;
            let config = StationConfig::load(&config_path)?;
            run_operator_loop(config, &config_path, model, mode.into(), upc, dashboard, cli.json)
        }
        Commands::Simulate { runs, p_human, p_system, seed, dashboard } => {
            if !(0.0..=1.0).contains(&p_human) || !(0.0..=1.0).contains(&p_system) {
                bail!("probabilities must be within 0..=1");
            }
            run_simulation(SimulationParams { runs, p_human, p_system }, seed, dashboard, cli.json)
        }
        Commands::Parse { raw } => {
            let response = bk_station::parse(&raw);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("STATUS={}", response.status.map_or("-".to_string(), |s| s.to_string()));
                println!("DSN={}", response.dsn.as_deref().unwrap_or("-"));
                let mut fields: Vec<_> = response.fields.iter().collect();
                fields.sort();
                for (key, value) in fields {
                    println!("  {}={}", key, value);
                }
            }
            Ok(())
        }
        Commands::Ports => {
            let ports = serialport::available_ports().context("could not enumerate serial ports")?;
            if ports.is_empty() {
                println!("No serial ports found.");
            }
            for port in ports {
                println!("{}", port.port_name);
            }
            Ok(())
        }
        Commands::Models => {
            let config = StationConfig::load(&config_path)?;
            if cli.json {
                let models: Vec<_> = config.models.values().collect();
                println!("{}", serde_json::to_string_pretty(&models)?);
            } else {
                for profile in config.models.values() {
                    println!("{}  SSN2={}  SSN8={}", profile.model_code, profile.expected_ssn2, profile.expected_ssn8);
                }
            }
            Ok(())
        }
    }
}

fn run_operator_loop(
    config: StationConfig,
    config_path: &Path,
    model: String,
    mode: BookMode,
    upc: Option<String>,
    dashboard: bool,
    json: bool,
) -> anyhow::Result<()> {
    let mut station = Station::new(SerialChannel::new(), config);
    station.set_config_path(config_path);
    station.select_model(model.clone());
    station.set_mode(mode);
    station.set_station_upc(upc);

    println!("==========================");
    println!("  Book Station - {}", model);
    println!("==========================");
    println!("Scan books, or type 'back' to finish.");

    loop {
        station.begin_cycle();

        let Some(book1) = prompt("BOOK1> ")? else { break };
        station.books_mut().commit_book1(&book1);
        if mode == BookMode::TwoBook {
            let Some(book2) = prompt("BOOK2> ")? else { break };
            station.books_mut().commit_book2(&book2);
        }

        let outcome = station.run_cycle();
        print_outcome(&outcome, &station.snapshot(), json)?;
    }

    let snapshot = station.snapshot();
    if dashboard {
        dashboard::show(&snapshot, &format!("Station KPI - {}", model))?;
    }
    print_snapshot(&snapshot, json)
}

// Reads one line from stdin. `None` on EOF or when the operator asks to leave.
fn prompt(label: &str) -> io::Result<Option<String>> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    match line.trim() {
        "back" | "exit" => Ok(None),
        _ => Ok(Some(line)),
    }
}

fn print_outcome(outcome: &CycleOutcome, snapshot: &KpiSnapshot, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(outcome)?);
        return Ok(());
    }
    if outcome.ok {
        println!("< PASS  DSN={}", outcome.dsn().unwrap_or("-"));
    } else {
        println!("< {}", outcome.message);
    }
    println!(
        "  real {}/{} ({:.2}%) | reported {}/{} ({:.2}%)",
        snapshot.counters.real_pass,
        snapshot.counters.real_total,
        snapshot.real_rate,
        snapshot.counters.rep_pass,
        snapshot.counters.rep_total,
        snapshot.rep_rate
    );
    Ok(())
}

fn print_snapshot(snapshot: &KpiSnapshot, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
        return Ok(());
    }
    let c = snapshot.counters;
    println!("REAL pass={} fail={} rate={:.2}%", c.real_pass, c.real_fail, snapshot.real_rate);
    println!("REP  pass={} fail={} total={} rate={:.2}%", c.rep_pass, c.rep_fail, c.rep_total, snapshot.rep_rate);
    match snapshot.avg_cycle_seconds {
        Some(avg) => println!("cycle_time: {:.3} s", avg),
        None => println!("cycle_time: -"),
    }
    Ok(())
}

fn run_simulation(params: SimulationParams, seed: Option<u64>, dashboard: bool, json: bool) -> anyhow::Result<()> {
    let (mut reporter, mut rng) = match seed {
        Some(seed) => (KpiReporter::seeded(seed), StdRng::seed_from_u64(seed.wrapping_add(1))),
        None => (KpiReporter::new(), StdRng::from_entropy()),
    };
    let report = simulation::simulate(&mut reporter, &params, &mut rng);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_snapshot(&report.snapshot, false)?;
        for (cause, count) in &report.causes {
            println!("  {:<13} {}", cause.to_string(), count);
        }
        println!("shift: {}  elapsed={:.3}s", if report.shift_passed { "PASS" } else { "FAIL" }, report.elapsed_seconds);
    }

    if dashboard {
        dashboard::show(&report.snapshot, "Simulation KPI")?;
    }
    Ok(())
}
