use std::fs;
use std::path::Path;

use log::info;
use simple_logger::SimpleLogger;

use sb_rust::sb_interface::seed_hex;
use sb_rust::{
    run_sweep, Finality, NodeLayout, SimConfig, SimError, SimRunner, SnowballParameters,
};

fn main() {
    SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .unwrap();

    let sweep = std::env::args().any(|a| a == "--sweep");
    if let Err(e) = run(sweep) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(sweep: bool) -> Result<(), SimError> {
    info!("starting");

    let config = SimConfig {
        name: "split_250".to_string(),
        params: SnowballParameters::new(21, 11, 11, 30)?,
        layout: NodeLayout::honest_split(125, 125),
        runs: 10,
        finality: Finality::Partial,
        ..SimConfig::default()
    };

    let threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let runner = SimRunner::new(config.clone())?;
    let result = runner.run_parallel(threads)?;

    result
        .summary
        .print_summary("Snowball - 250 honest nodes, 125/125");
    println!("Seed: {}", seed_hex(&runner.seed()));

    let dir = Path::new("outputs");
    fs::create_dir_all(dir)?;
    let out = dir.join("split_250.json");
    fs::write(&out, serde_json::to_string_pretty(&result.runs)?)?;
    println!("Per-run records written to {}", out.display());

    if sweep {
        let sweep_config = SimConfig {
            finality: Finality::Full,
            seed: Some(runner.seed()),
            ..config
        };
        let alphas: Vec<usize> = (11..=21).collect();
        let points = run_sweep(&sweep_config, &alphas)?;

        let out = dir.join("alpha_confidence_sweep.json");
        fs::write(&out, serde_json::to_string_pretty(&points)?)?;

        println!("\nAlphaConfidence sweep:");
        for point in &points {
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
        println!("Sweep written to {}", out.display());
    }

    Ok(())
}
