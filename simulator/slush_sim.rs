// Slush Simulator - centralized Slush and weighted Slush over a range of
// Byzantine counts
//
// Usage:
//   cargo run --bin slush_sim
//   cargo run --bin slush_sim -- --seed 0x1234...

use std::env;

use rand::{Rng, SeedableRng};
use sb_rust::sb_error::SimError;
use sb_rust::sb_interface::{
    derive_seed, parse_seed_hex, resolve_seed, seed_hex, Preference, Seed, SimRng,
};
use sb_rust::sb_slush::{slush, weighted_slush, SlushConfig, SlushOutcome};
use simple_logger::SimpleLogger;

const NUM_NODES: usize = 200;
const RUNS_PER_POINT: usize = 20;
const BYZANTINE_COUNTS: [usize; 6] = [0, 10, 20, 30, 40, 60];

#[derive(Default)]
struct PointStats {
    decided: usize,
    ones: usize,
    rounds: Vec<usize>,
}

impl PointStats {
    fn add(&mut self, outcome: &SlushOutcome) {
        if outcome.decided {
            self.decided += 1;
            self.rounds.push(outcome.rounds);
        }
        if outcome.decision == Preference::One {
            self.ones += 1;
        }
    }

    fn avg_rounds(&self) -> String {
        if self.rounds.is_empty() {
            "-".to_string()
        } else {
            let avg = self.rounds.iter().sum::<usize>() as f64 / self.rounds.len() as f64;
            format!("{:.0}", avg)
        }
    }
}

/// Byzantine nodes first, all stuck on 0; the honest nodes lean towards 1.
fn initial_colors(num_byzantine: usize, rng: &mut SimRng) -> Vec<Preference> {
    let mut colors = vec![Preference::Zero; num_byzantine];
    colors.extend((num_byzantine..NUM_NODES).map(|_| {
        if rng.gen_bool(0.6) {
            Preference::One
        } else {
            Preference::Zero
        }
    }));
    colors
}

fn main() {
    SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .init()
        .unwrap();

    let args: Vec<String> = env::args().collect();
    let seed = match args.get(1).map(String::as_str) {
        Some("--seed") => match args.get(2).map(|hex| parse_seed_hex(hex)) {
            Some(Ok(seed)) => Some(seed),
            _ => {
                eprintln!("Usage: {} [--seed SEED_HEX]", args[0]);
                std::process::exit(1);
            }
        },
        _ => None,
    };

    if let Err(e) = run(resolve_seed(seed)) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(seed: Seed) -> Result<(), SimError> {
    println!("╔════════════════════════════════════════════════════════╗");
    println!("║    Slush Simulator                                     ║");
    println!("╚════════════════════════════════════════════════════════╝\n");
    println!("Seed: {}", seed_hex(&seed));
    println!("Nodes: {}, runs per point: {}\n", NUM_NODES, RUNS_PER_POINT);

    let mut master = SimRng::from_seed(seed);

    println!(
        "{:>10} | {:>14} {:>8} {:>7} | {:>14} {:>8} {:>7}",
        "byzantine", "slush decided", "on 1", "rounds", "weighted dec.", "on 1", "rounds"
    );
    println!("{}", "-".repeat(82));

    for num_byzantine in BYZANTINE_COUNTS {
        let config = SlushConfig {
            num_nodes: NUM_NODES,
            num_byzantine,
            k: 20,
            alpha: 14.0,
            num_param_nodes: 10,
            max_rounds: Some(50_000),
        };

        let mut plain = PointStats::default();
        let mut weighted = PointStats::default();

        for _ in 0..RUNS_PER_POINT {
            let mut rng = SimRng::from_seed(derive_seed(&mut master));
            let colors = initial_colors(num_byzantine, &mut rng);
            let weights: Vec<f64> = (0..NUM_NODES).map(|_| rng.gen_range(0.1..1.0)).collect();

            let mut c = colors.clone();
            plain.add(&slush(&config, &mut c, &mut rng)?);

            let mut c = colors;
            weighted.add(&weighted_slush(&config, &mut c, &weights, &mut rng)?);
        }

        println!(
            "{:>10} | {:>11}/{:<2} {:>8} {:>7} | {:>11}/{:<2} {:>8} {:>7}",
            num_byzantine,
            plain.decided,
            RUNS_PER_POINT,
            plain.ones,
            plain.avg_rounds(),
            weighted.decided,
            RUNS_PER_POINT,
            weighted.ones,
            weighted.avg_rounds()
        );
    }

    println!("\n✓ Slush sweep complete!\n");
    Ok(())
}
