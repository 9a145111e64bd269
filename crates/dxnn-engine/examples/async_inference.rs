//! Asynchronous dispatch against the software backend
//!
//! Demonstrates the three delivery paths: callback, explicit wait on a job
//! id, and ordered batch collection. Runs without hardware.

use dxnn_engine::{EngineOptions, InferenceEngine, SoftwareBackend};
use dxnn_model::{DataType, Model, TensorInfo};
use std::sync::Arc;
use std::time::Duration;

fn main() -> dxnn_engine::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("dxnn_engine=debug")
        .init();

    let model = Model::from_parts(
        "async_demo",
        vec![TensorInfo::new("in", vec![32], DataType::UInt8)],
        vec![TensorInfo::new("out", vec![16], DataType::UInt8)],
    );
    let backend = SoftwareBackend::new(&model)
        .with_cores(3)
        .with_latency(Duration::from_millis(5));

    let engine = InferenceEngine::with_backend(
        model,
        Arc::new(backend),
        EngineOptions::default().with_buffer_count(4),
    )?;

    // Callback delivery.
    engine.register_callback(|completion| {
        match completion.result {
            Ok(output) => println!("callback: {} -> {} bytes", completion.job_id, output.len()),
            Err(e) => println!("callback: {} failed: {e}", completion.job_id),
        }
        0
    });
    for i in 0..4u8 {
        engine.run_async(&[i; 32], Some(Box::new(i)))?;
    }

    // Wait delivery (no callback consulted for sync runs).
    let output = engine.run(&[9u8; 32])?;
    println!(
        "sync: {} -> {} bytes in {:?}",
        output.job_id(),
        output.len(),
        output.latency()
    );

    // Ordered batch collection.
    let inputs: Vec<Vec<u8>> = (0..6u8).map(|i| vec![i; 32]).collect();
    let outputs = engine.run_batch(&inputs)?;
    println!("batch: {} ordered outputs", outputs.len());

    engine.close();
    println!("mean latency: {:.0} us", engine.latency_mean_us());
    Ok(())
}
