// Scenario Runner - Load and execute Snowball scenario YAML files
//
// Usage:
//   cargo run --bin scenario_runner scenarios/split_250.yaml
//   cargo run --bin scenario_runner scenarios/  (runs all .yaml files in directory)
//   cargo run --bin scenario_runner scenarios/split_250.yaml --seed 0x1234... --output outputs/

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use sb_rust::sb_error::SimError;
use sb_rust::sb_interface::{parse_seed_hex, Seed};
use sb_rust::sb_runner::{run_sweep, SimConfig, SimResult, SimRunner};
use simple_logger::SimpleLogger;

/// Scenario file format
#[derive(Debug, serde::Deserialize)]
struct ScenarioFile {
    #[serde(default)]
    meta: ScenarioMeta,

    config: SimConfig,

    /// Worker threads for the runs (sequential when absent)
    #[serde(default)]
    threads: Option<usize>,

    /// Optional AlphaConfidence sweep over the same layout
    #[serde(default)]
    sweep_alpha_confidence: Vec<usize>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct ScenarioMeta {
    name: Option<String>,
    description: Option<String>,
}

struct Options {
    seed: Option<Seed>,
    output: PathBuf,
}

fn usage(program: &str) -> ! {
    eprintln!(
        "Usage: {} <scenario.yaml | directory/> [--seed SEED_HEX] [--output DIR]",
        program
    );
    eprintln!("\nExamples:");
    eprintln!("  {} scenarios/split_250.yaml", program);
    eprintln!("  {} scenarios/", program);
    eprintln!("  {} scenarios/split_250.yaml --seed 0x123456...", program);
    std::process::exit(1);
}

fn parse_options(program: &str, rest: &[String]) -> Result<Options, SimError> {
    let mut options = Options {
        seed: None,
        output: PathBuf::from("outputs"),
    };

    let mut i = 0;
    while i < rest.len() {
        match (rest[i].as_str(), rest.get(i + 1)) {
            ("--seed", Some(hex)) => options.seed = Some(parse_seed_hex(hex)?),
            ("--output", Some(dir)) => options.output = PathBuf::from(dir),
            _ => usage(program),
        }
        i += 2;
    }
    Ok(options)
}

fn main() {
    SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .unwrap();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        usage(&args[0]);
    }

    let options = parse_options(&args[0], &args[2..]).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    let path = Path::new(&args[1]);
    let outcome = if path.is_file() {
        run_scenario_file(path, &options)
    } else if path.is_dir() {
        run_scenario_directory(path, &options)
    } else {
        eprintln!("Error: Path does not exist: {}", path.display());
        std::process::exit(1);
    };

    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_scenario_directory(dir: &Path, options: &Options) -> Result<(), SimError> {
    let mut scenarios = Vec::new();

    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        let ext = path.extension().and_then(|s| s.to_str());
        if ext == Some("yaml") || ext == Some("yml") {
            scenarios.push(path);
        }
    }

    scenarios.sort();

    if scenarios.is_empty() {
        eprintln!("No .yaml files found in {}", dir.display());
        std::process::exit(1);
    }

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  SCENARIO RUNNER - Multiple Scenarios                  ║");
    println!("╚════════════════════════════════════════════════════════╝\n");
    println!("Found {} scenario(s) to run\n", scenarios.len());

    for (i, scenario_path) in scenarios.iter().enumerate() {
        println!(
            "\n{}/{} Running: {}\n",
            i + 1,
            scenarios.len(),
            scenario_path.display()
        );
        run_scenario_file(scenario_path, options)?;
    }

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  All scenarios complete!                               ║");
    println!("╚════════════════════════════════════════════════════════╝\n");
    Ok(())
}

fn run_scenario_file(path: &Path, options: &Options) -> Result<(), SimError> {
    println!("Loading scenario from: {}", path.display());

    let yaml_content = fs::read_to_string(path)?;
    let scenario: ScenarioFile = serde_yaml::from_str(&yaml_content)?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("scenario")
        .to_string();
    let name = scenario.meta.name.clone().unwrap_or_else(|| stem.clone());

    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  {:<54}║", name);
    println!("╚════════════════════════════════════════════════════════╝\n");

    if let Some(ref desc) = scenario.meta.description {
        println!("{}\n", desc);
    }

    let mut config = scenario.config;
    config.name = name.clone();
    config.seed = options.seed;

    let p = &config.params;
    println!("Configuration:");
    println!(
        "  K={} AlphaPreference={} AlphaConfidence={} Beta={}",
        p.k, p.alpha_preference, p.alpha_confidence, p.beta
    );
    for (node_type, count) in &config.layout.counts {
        println!("  {}: {}", node_type, count);
    }
    println!(
        "  Runs: {}  Finality: {:?}  Discipline: {:?}  Engine: {:?}",
        config.runs, config.finality, config.discipline, config.engine
    );
    println!("\nStarting simulation...\n");

    let runner = SimRunner::new(config.clone())?;
    let result = match scenario.threads {
        Some(threads) => runner.run_parallel(threads)?,
        None => runner.run()?,
    };

    result.summary.print_summary(&name);
    println!("Seed: {}", result.seed);

    let out = write_result(&options.output, &stem, &result)?;
    println!("Per-run records written to {}", out.display());

    if !scenario.sweep_alpha_confidence.is_empty() {
        println!("\nAlphaConfidence sweep:");
        config.seed = Some(runner.seed());
        for point in run_sweep(&config, &scenario.sweep_alpha_confidence)? {
            println!(
                "  αc={:<3} full={}/{} avg rounds to full={}",
                point.alpha_confidence,
                point.summary.runs_reached_full,
                point.summary.num_runs,
                point
                    .summary
                    .avg_rounds_to_full
                    .map(|r| format!("{:.1}", r))
                    .unwrap_or_else(|| "-".to_string())
            );
        }
    }

    println!("\n✓ Scenario complete!\n");
    Ok(())
}

fn write_result(dir: &Path, stem: &str, result: &SimResult) -> Result<PathBuf, SimError> {
    fs::create_dir_all(dir)?;
    let out = dir.join(format!("{}.json", stem));
    fs::write(&out, serde_json::to_string_pretty(&result.runs)?)?;
    Ok(out)
}
