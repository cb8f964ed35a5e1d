use clap::{Parser, Subcommand};
use deco_core::*;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "decoplan")]
#[command(about = "Decompression planner for open-circuit dives", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log planner detail to stderr (DECO_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a dive from a TOML plan file
    Plan {
        /// Plan file with [[gases]] and [[levels]]
        plan: PathBuf,

        /// Decompression model (buhlmann, vpm)
        #[arg(long, default_value = "buhlmann")]
        model: String,

        /// Gradient factor low, percent
        #[arg(long)]
        gf_low: Option<u8>,

        /// Gradient factor high, percent
        #[arg(long)]
        gf_high: Option<u8>,

        /// VPM conservatism, 0-4
        #[arg(long)]
        conservatism: Option<u8>,

        /// Also write the table to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Print the full result as JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Append the dive to the logbook
        #[arg(long)]
        log: bool,

        /// Start from the last logged dive
        #[arg(long, requires = "surface_interval")]
        repetitive: bool,

        /// Minutes at the surface since the last logged dive
        #[arg(long, requires = "repetitive")]
        surface_interval: Option<u32>,
    },

    /// Print the effective configuration
    Config {
        /// Write the effective configuration back to the config file
        #[arg(long)]
        write: bool,
    },

    /// List logged dives
    Logbook {
        /// Only dives logged in the last N hours
        #[arg(long, default_value_t = 24 * 7)]
        hours: i64,

        /// Append the logbook to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    deco_core::logging::init_verbose(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Plan {
            plan,
            model,
            gf_low,
            gf_high,
            conservatism,
            csv,
            json,
            log,
            repetitive,
            surface_interval,
        } => {
            let options = PlanOptions {
                model: model.parse()?,
                gf_low,
                gf_high,
                conservatism,
                csv,
                json,
                log,
                surface_interval: if repetitive { surface_interval } else { None },
            };
            cmd_plan(&plan, options, config)
        }
        Commands::Config { write } => cmd_config(&config, cli.config.as_deref(), write),
        Commands::Logbook { hours, csv } => cmd_logbook(&config, hours, csv),
    }
}

struct PlanOptions {
    model: DecoModel,
    gf_low: Option<u8>,
    gf_high: Option<u8>,
    conservatism: Option<u8>,
    csv: Option<PathBuf>,
    json: bool,
    log: bool,
    surface_interval: Option<u32>,
}

fn cmd_plan(plan_path: &Path, options: PlanOptions, mut config: Config) -> Result<()> {
    if let Some(gf) = options.gf_low {
        config.buhlmann.gf_low = f64::from(gf) / 100.0;
    }
    if let Some(gf) = options.gf_high {
        config.buhlmann.gf_high = f64::from(gf) / 100.0;
    }
    if let Some(level) = options.conservatism {
        config.vpm.conservatism = level;
    }
    config.validate()?;
    let settings = config.settings();
    tracing::debug!("Planning {:?} with the {} model", plan_path, options.model.as_str());

    let plan = DivePlan::load(plan_path)?;
    let errors = plan.validate();
    if !errors.is_empty() {
        eprintln!("Plan validation errors:");
        for error in &errors {
            eprintln!("  - {}", error);
        }
        return Err(Error::InvalidPlan(errors.join("; ")));
    }
    let mut input = plan.expand()?;

    if let Some(minutes) = options.surface_interval {
        let previous = latest_dive(&config.logbook.path)?.ok_or_else(|| {
            Error::Other(format!(
                "no dives in logbook {} to continue from",
                config.logbook.path.display()
            ))
        })?;
        input.initial = Some(repetitive_start(&previous, options.model, &settings, minutes)?);
    }

    let result = plan_dive(&input, &settings, options.model)?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        display_result(&result);
    }
    for warning in &result.warnings {
        eprintln!("warning: {}", warning.message);
    }

    if let Some(csv_path) = &options.csv {
        write_table_csv(&result.rows, csv_path)?;
        if !options.json {
            println!("✓ Table written to {}", csv_path.display());
        }
    }

    if options.log {
        let label = plan_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        let record = DiveRecord::from_result(&result, label, options.surface_interval);
        let mut sink = JsonlSink::new(&config.logbook.path);
        sink.append(&record)?;
        if !options.json {
            println!("✓ Dive logged ({})", record.id);
        }
    }

    Ok(())
}

fn cmd_config(config: &Config, path: Option<&Path>, write: bool) -> Result<()> {
    let contents = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
    print!("{}", contents);

    if write {
        let target = match path {
            Some(path) => {
                config.save_to(path)?;
                path.to_path_buf()
            }
            None => {
                config.save()?;
                Config::default_config_path()
            }
        };
        println!("✓ Config written to {}", target.display());
    }
    Ok(())
}

fn cmd_logbook(config: &Config, hours: i64, csv: Option<PathBuf>) -> Result<()> {
    let path = &config.logbook.path;
    let dives = load_recent_dives(path, hours)?;
    if dives.is_empty() {
        println!("No dives logged in the last {} hours.", hours);
    }
    for dive in &dives {
        println!(
            "{}  {:<8} {:>5.0} min  deco {:>4.0} min  CNS {:>3.0}%  {}",
            dive.logged_at.format("%Y-%m-%d %H:%M"),
            dive.model.as_str(),
            dive.summary.total_runtime,
            dive.summary.total_deco_time,
            dive.summary.cns_percent,
            dive.label.as_deref().unwrap_or("-"),
        );
    }

    if let Some(csv_path) = csv {
        let count = deco_core::export::logbook_to_csv(path, &csv_path)?;
        println!("✓ Exported {} dives to {}", count, csv_path.display());
    }
    Ok(())
}

fn display_result(result: &DiveResult) {
    let with_gf = result.model == DecoModel::Buhlmann;
    println!();
    println!(
        "  {:<8} {:>6} {:>6} {:>6}  {:<7} {:>5} {:>5} {:>7}{}",
        "",
        "Depth",
        "Time",
        "Run",
        "Gas",
        "PO2",
        "END",
        "Litres",
        if with_gf { "    GF" } else { "" }
    );
    for row in &result.rows {
        let kind = match row.kind {
            RowKind::Level => "Level",
            RowKind::Stop => "Stop",
            RowKind::Surface => "Surface",
        };
        let gf = match (with_gf, row.gf) {
            (true, Some(gf)) => format!("{:>6.0}", gf),
            _ => String::new(),
        };
        println!(
            "  {:<8} {:>6.0} {:>6.1} {:>6.1}  {:<7} {:>5.2} {:>5.0} {:>7.0}{}",
            kind,
            row.depth,
            row.duration,
            row.end_runtime,
            row.gas,
            row.po2,
            row.end,
            row.gas_volume,
            gf
        );
    }

    let summary = &result.summary;
    println!();
    println!(
        "  Runtime {:.0} min, deco {:.0} min, ascent {:.1} min",
        summary.total_runtime, summary.total_deco_time, summary.total_ascent_time
    );
    println!("  CNS {:.0}%, OTU {:.0}", summary.cns_percent, summary.otu);
    if let Some(depth) = summary.offgassing_starts_at {
        println!("  Off-gassing starts at {:.0} m", depth);
    }
    if let Some(gf) = summary.highest_gf {
        println!("  Highest GF {:.0}%", gf);
    }
    for volume in &summary.gas_volumes {
        println!("  {:<7} {:>7.0} l", volume.gas, volume.litres);
    }
    println!();
}
