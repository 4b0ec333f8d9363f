//! Parameter Learning Example: EM with expected counts
//!
//! A two-component mixture over three binary features. The component is
//! never observed; the engine supplies expected counts (E-step) and this
//! example turns them into new tables (M-step) until the log-likelihood
//! stops improving.

use dfgraph::{
    masks_from_record, EngineConfig, FactorGraph, InferenceEngine, PotentialTable, StateMask,
};
use scirs2_core::ndarray::{ArrayD, Axis};

const NUM_FEATURES: usize = 3;

/// Component variable 0 with features 1..=3, all sharing one emission table.
fn build_model(prior: &[f64], emission: &[f64]) -> Result<FactorGraph, dfgraph::PgmError> {
    let mut neighbors = vec![vec![0]];
    let mut potential_map = vec![0];
    for feature in 1..=NUM_FEATURES {
        neighbors.push(vec![0, feature]);
        potential_map.push(1);
    }
    FactorGraph::new(
        vec![2; NUM_FEATURES + 1],
        vec![
            PotentialTable::from_shape_vec(vec![2], prior.to_vec())?,
            PotentialTable::from_shape_vec(vec![2, 2], emission.to_vec())?,
        ],
        neighbors,
        potential_map,
    )
}

/// Normalise each row of a count table (last axis sums to one).
fn normalize_rows(counts: &ArrayD<f64>) -> ArrayD<f64> {
    let mut table = counts.clone();
    if table.ndim() == 1 {
        let total = table.sum();
        table.mapv_inplace(|c| c / total);
        return table;
    }
    for mut row in table.axis_iter_mut(Axis(0)) {
        let total = row.sum();
        row.mapv_inplace(|c| c / total);
    }
    table
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== EM Parameter Learning Example ===\n");

    // Ground truth: component 0 mostly emits 0, component 1 mostly emits 1
    let truth = build_model(&[0.3, 0.7], &[0.85, 0.15, 0.1, 0.9])?;
    let mut generator = InferenceEngine::new(truth, EngineConfig::new().with_seed(7));

    println!("Generating 200 records from the true model...");
    let samples = generator.simulate(200, &[])?;
    let records: Vec<Vec<StateMask>> = samples
        .rows()
        .into_iter()
        .map(|row| {
            let mut record = vec![None];
            record.extend(row.iter().skip(1).map(|&x| Some(x)));
            masks_from_record(&record)
        })
        .collect();
    println!("Sample record: {:?}\n", records[0]);

    // Asymmetric start so the components can separate
    let model = build_model(&[0.5, 0.5], &[0.6, 0.4, 0.45, 0.55])?;
    let mut engine = InferenceEngine::new(model, EngineConfig::default());

    println!("=== Learning with EM ===\n");
    let mut previous = f64::NEG_INFINITY;
    for iteration in 0..50 {
        let counts = engine.expected_counts(&records)?.to_vec();
        let log_likelihood = engine.counts().log_likelihood();
        println!("Iteration {:2}: log-likelihood = {:.4}", iteration, log_likelihood);

        if log_likelihood - previous < 1e-6 {
            println!("Converged.");
            break;
        }
        previous = log_likelihood;

        let tables = counts
            .iter()
            .map(|c| PotentialTable::new(normalize_rows(c)))
            .collect::<Result<Vec<_>, _>>()?;
        engine.reset_potentials(tables)?;
    }

    println!("\nLearned parameters:");
    let potentials = engine.potentials();
    println!("  P(component) = {:?}", potentials[0].values().as_slice());
    println!("  P(feature | component) = {:?}", potentials[1].values().as_slice());

    println!("\n=== Example Complete ===");
    Ok(())
}
