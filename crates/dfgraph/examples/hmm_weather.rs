//! Hidden Markov Model Example: Weather Prediction
//!
//! The HMM is built as a factor graph whose transition and emission tables
//! are shared by every time step. Demonstrates:
//! - Smoothing: P(weather_t | all umbrella observations)
//! - Viterbi: most likely weather sequence (max-sum)
//! - Likelihood of the observations
//! - Posterior sampling of weather sequences

use dfgraph::{
    masks_from_record, EngineConfig, FactorGraph, InferenceEngine, PotentialTable,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Hidden Markov Model: Weather Prediction ===\n");

    // Hidden states: Weather (Sunny=0, Rainy=1)
    // Observations: Umbrella (No=0, Yes=1)
    let time_steps = 5;

    // Variables 0..T are the weather, T..2T the umbrella observations
    let cardinalities = vec![2; 2 * time_steps];

    // Slot 0: P(Weather_0), slot 1: P(W_t | W_{t-1}), slot 2: P(U_t | W_t)
    let initial = PotentialTable::from_shape_vec(vec![2], vec![0.6, 0.4])?;
    let transition = PotentialTable::from_shape_vec(
        vec![2, 2],
        vec![
            0.7, 0.3, // Sunny -> [Sunny, Rainy]
            0.4, 0.6, // Rainy -> [Sunny, Rainy]
        ],
    )?;
    let emission = PotentialTable::from_shape_vec(
        vec![2, 2],
        vec![
            0.9, 0.1, // Sunny -> [No, Yes]
            0.2, 0.8, // Rainy -> [No, Yes]
        ],
    )?;

    let mut neighbors = vec![vec![0]];
    let mut potential_map = vec![0];
    for t in 1..time_steps {
        neighbors.push(vec![t - 1, t]);
        potential_map.push(1);
    }
    for t in 0..time_steps {
        neighbors.push(vec![t, time_steps + t]);
        potential_map.push(2);
    }

    let graph = FactorGraph::new(
        cardinalities,
        vec![initial, transition, emission],
        neighbors,
        potential_map,
    )?;
    println!(
        "✓ Built HMM: {} variables, {} factors sharing {} tables",
        graph.num_variables(),
        graph.num_factors(),
        graph.num_potentials()
    );

    // Umbrella sequence: No, Yes, Yes, No, Yes
    let umbrella = [0, 1, 1, 0, 1];
    let mut record = vec![None; time_steps];
    record.extend(umbrella.iter().map(|&u| Some(u)));
    let evidence = masks_from_record(&record);
    println!("Observations (umbrella): {:?}\n", umbrella);

    let mut engine = InferenceEngine::new(graph, EngineConfig::new().with_seed(42));

    // Smoothing
    println!("--- Smoothed P(Rainy_t | observations) ---");
    {
        let beliefs = engine.marginals(&evidence)?;
        for t in 0..time_steps {
            if let Some(marginal) = beliefs.variable_marginal(t) {
                println!("  day {}: {:.4}", t, marginal[1]);
            }
        }
    }

    // Viterbi
    let map = engine.max_prob_state(&evidence)?;
    let names: Vec<&str> = map.states[..time_steps]
        .iter()
        .map(|&s| if s == 0 { "Sunny" } else { "Rainy" })
        .collect();
    println!("\n--- Most likely weather ---");
    println!("  {:?} (joint probability {:.6})", names, map.score());

    // Likelihood
    println!("\n--- Likelihood ---");
    println!("  P(observations) = {:.6}", engine.likelihood(&evidence)?);
    println!("  log P(observations) = {:.4}", engine.log_likelihood(&evidence)?);

    // Posterior samples
    println!("\n--- Posterior weather samples ---");
    let samples = engine.simulate(5, &evidence)?;
    for row in samples.rows() {
        let weather: Vec<usize> = row.iter().take(time_steps).copied().collect();
        println!("  {:?}", weather);
    }

    println!("\n=== Example Complete ===");
    Ok(())
}
