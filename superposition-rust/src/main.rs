// ============================================================================
// SUPERPOSITION TOY MODEL — headless trainer
// Trains one tied-weight autoencoder and reports how its features share space.
// ============================================================================

use std::env;
use std::time::Instant;

use anyhow::{Context, Result};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use superposition::{importance_order, CliConfig, Model};

fn print_usage() {
    println!("\nUsage: superposition-rust [options]");
    println!("Model: --inputDim=20 --hiddenDim=5 --activation=linear|relu --variant=importance|sparse --seed=7");
    println!("Train: --steps=10000 --batchSize=1024 --learningRate=0.001 --lrSchedule=constant|linear|cosine|exponential");
    println!("Data:  --sparsity=0.1 --importance=1.0 --sparsityWeight=0.1 --convergenceThreshold=1e-5");
    println!("Output: --progressEvery=10 --evalSamples=500 --json=true\n");
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("superposition=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = CliConfig::from_args(env::args().skip(1)).context("parsing arguments")?;
    let (m, t) = (&cli.model, &cli.train);
    if !cli.json {
        print_usage();
        println!(
            "Config: input={} hidden={} activation={:?} variant={:?} optimizer={:?} steps={} batch={} lr={} schedule={:?} sparsity={} importance={}",
            m.input_dim, m.hidden_dim, m.activation, m.variant, m.optimizer_kind(),
            t.steps, t.batch_size, t.learning_rate, t.lr_schedule, t.sparsity, t.importance
        );
        println!("\nTraining...\n");
    }

    let mut model = Model::new(&cli.model).context("building model")?;
    let t0 = Instant::now();
    let quiet = cli.json;
    let report = model.train_with_progress(cli.train.clone(), |p| {
        if !quiet {
            println!(
                "Step {:6} | Loss: {:.6e} | LR: {:.2e} | Time: {:.1}s",
                p.step, p.loss, p.learning_rate, t0.elapsed().as_secs_f64()
            );
        }
    })?;

    let analysis = model.analyze_representation();
    let quality = model.compute_feature_reconstruction_quality(cli.eval_samples, t.sparsity, t.importance);
    let order = importance_order(&quality.importance);

    if cli.json {
        let features: Vec<_> = order.iter().map(|&i| json!({
            "feature": i,
            "importance": quality.importance[i],
            "quality": quality.qualities[i],
            "count": quality.counts[i],
            "norm": analysis.feature_norms[i],
        })).collect();
        let doc = json!({
            "config": cli,
            "report": report,
            "orthogonality": analysis.orthogonality,
            "gram": analysis.gram,
            "bias": model.bias(),
            "loss_history": model.loss_history(),
            "features": features,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    let status = if report.converged {
        "Training converged!"
    } else if report.stopped {
        "Training stopped"
    } else {
        "Training completed"
    };
    println!(
        "\n{} | Steps: {} | Final loss: {:.6e} | Time: {:.1}s",
        status, report.steps, report.final_loss, t0.elapsed().as_secs_f64()
    );
    println!("Orthogonality: {:.4}\n", analysis.orthogonality);
    println!("{:>8} {:>11} {:>8} {:>8} {:>7}", "feature", "importance", "quality", "norm", "seen");
    println!("{}", "-".repeat(46));
    for &i in &order {
        println!(
            "{:>8} {:>11.4} {:>8.4} {:>8.4} {:>7}",
            i, quality.importance[i], quality.qualities[i], analysis.feature_norms[i], quality.counts[i]
        );
    }
    Ok(())
}
