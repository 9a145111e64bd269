//! Dispatch core behavior tests
//!
//! Everything here runs against the software backend, so the scheduling
//! and delivery contracts are exercised without hardware.

use dxnn_engine::{
    BackendType, ComputeBackend, EngineError, EngineOptions, InferenceEngine, SoftwareBackend,
};
use dxnn_model::{DataType, Model, TensorInfo};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const INPUT_SIZE: usize = 16;
const OUTPUT_SIZE: usize = 8;

fn test_model() -> Model {
    Model::from_parts(
        "dispatch_test",
        vec![TensorInfo::new("in", vec![INPUT_SIZE], DataType::UInt8)],
        vec![TensorInfo::new("out", vec![OUTPUT_SIZE], DataType::UInt8)],
    )
}

fn open_engine(buffers: usize, cores: usize, latency: Option<Duration>) -> InferenceEngine {
    let model = test_model();
    let mut backend = SoftwareBackend::new(&model).with_cores(cores);
    if let Some(latency) = latency {
        backend = backend.with_latency(latency);
    }
    InferenceEngine::with_backend(
        model,
        Arc::new(backend),
        EngineOptions::default()
            .with_buffer_count(buffers)
            .with_cores(cores),
    )
    .expect("engine open")
}

fn input(tag: u8) -> Vec<u8> {
    vec![tag; INPUT_SIZE]
}

#[test]
fn sync_run_returns_expected_output() {
    let engine = open_engine(2, 1, None);
    let data = input(3);

    let output = engine.run(&data).expect("run");
    assert_eq!(output.len(), OUTPUT_SIZE);
    assert_eq!(
        &output[..],
        SoftwareBackend::expected_output(&data, OUTPUT_SIZE)
    );
    assert!(output.latency() >= output.inference_time());
}

#[test]
fn wrong_sized_input_is_rejected() {
    let engine = open_engine(2, 1, None);

    let err = engine.run(&[0u8; INPUT_SIZE + 1]).unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidInput {
            expected: INPUT_SIZE,
            actual: 17
        }
    ));

    let err = engine.run_async(&[], None).unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput { actual: 0, .. }));
}

#[test]
fn job_ids_strictly_increase() {
    let engine = open_engine(4, 2, None);

    let mut previous = None;
    for i in 0..12u8 {
        let id = engine.run_async(&input(i), None).expect("submit");
        if let Some(prev) = previous {
            assert!(id > prev, "{id} not greater than {prev}");
        }
        previous = Some(id);
        // Consume so backpressure never interferes with this test.
        let _ = engine.wait(id).expect("wait");
    }
}

#[test]
fn n_submissions_yield_exactly_n_completions() {
    let engine = open_engine(4, 3, Some(Duration::from_millis(2)));

    let jobs: Vec<_> = (0..4u8)
        .map(|i| engine.run_async(&input(i), None).expect("submit"))
        .collect();

    let mut delivered = 0;
    for job in &jobs {
        let output = engine.wait(*job).expect("wait");
        assert_eq!(output.len(), OUTPUT_SIZE);
        delivered += 1;
    }
    assert_eq!(delivered, jobs.len());

    // Second delivery of any of them must fail.
    for job in &jobs {
        assert!(matches!(
            engine.wait(*job),
            Err(EngineError::UnknownJob { .. })
        ));
    }
}

#[test]
fn wait_on_never_issued_id_fails() {
    let engine = open_engine(2, 1, None);
    let real = engine.run_async(&input(0), None).expect("submit");
    let _ = engine.wait(real).expect("wait");

    // An id the engine never issued.
    let bogus = dxnn_engine::JobId::from_raw(9999);
    assert!(matches!(
        engine.wait(bogus),
        Err(EngineError::UnknownJob { id: 9999 })
    ));
}

#[test]
fn backpressure_blocks_until_first_job_consumed() {
    // 1 buffer, 1 core: the engine can hold exactly one unconsumed job.
    let engine = Arc::new(open_engine(1, 1, Some(Duration::from_millis(20))));

    let first = engine.run_async(&input(1), None).expect("first submit");

    let (progress_tx, progress_rx) = crossbeam_channel::unbounded();
    let engine2 = Arc::clone(&engine);
    let submitter = std::thread::spawn(move || {
        let second = engine2.run_async(&input(2), None).expect("second submit");
        progress_tx.send(second).expect("send");
        let third = engine2.run_async(&input(3), None).expect("third submit");
        progress_tx.send(third).expect("send");
    });

    // The first job completes quickly but stays unconsumed, so the second
    // submission must still be blocked.
    std::thread::sleep(Duration::from_millis(150));
    assert!(
        progress_rx.try_recv().is_err(),
        "second submission went through before the first was consumed"
    );

    let output = engine.wait(first).expect("wait first");
    // Result consumed but buffer still on loan: submission stays blocked.
    std::thread::sleep(Duration::from_millis(100));
    assert!(
        progress_rx.try_recv().is_err(),
        "second submission went through while the buffer was still held"
    );

    drop(output); // buffer back to the pool
    let second = progress_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("second submission never unblocked");

    let output = engine.wait(second).expect("wait second");
    drop(output);
    let third = progress_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("third submission never unblocked");

    let _ = engine.wait(third).expect("wait third");
    submitter.join().expect("submitter thread");
}

#[test]
fn batch_outputs_match_input_order() {
    let engine = open_engine(3, 3, Some(Duration::from_millis(5)));

    let inputs: Vec<Vec<u8>> = (0..8u8).map(input).collect();
    let outputs = engine.run_batch(&inputs).expect("run_batch");

    assert_eq!(outputs.len(), inputs.len());
    for (input, output) in inputs.iter().zip(&outputs) {
        assert_eq!(
            output,
            &SoftwareBackend::expected_output(input, OUTPUT_SIZE)
        );
    }
}

#[test]
fn callback_fires_exactly_once_per_job() {
    let engine = open_engine(4, 2, Some(Duration::from_millis(2)));

    let (done_tx, done_rx) = crossbeam_channel::unbounded();
    engine.register_callback(move |completion| {
        let tag = completion
            .context
            .and_then(|ctx| ctx.downcast_ref::<u8>())
            .copied();
        let data = completion.result.expect("callback got a failure").to_vec();
        done_tx.send((completion.job_id, tag, data)).expect("send");
        0
    });

    let jobs: Vec<_> = (0..5u8)
        .map(|i| {
            engine
                .run_async(&input(i), Some(Box::new(i)))
                .expect("submit")
        })
        .collect();

    let mut seen_tags = Vec::new();
    for _ in 0..5 {
        let (job_id, tag, data) = done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("callback did not fire");
        assert!(jobs.contains(&job_id));
        let tag = tag.expect("context lost");
        assert_eq!(data, SoftwareBackend::expected_output(&input(tag), OUTPUT_SIZE));
        seen_tags.push(tag);
    }
    seen_tags.sort_unstable();
    assert_eq!(seen_tags, vec![0, 1, 2, 3, 4]);

    // Exactly five: no sixth delivery shows up.
    assert!(done_rx.recv_timeout(Duration::from_millis(200)).is_err());

    // Callback consumed them; wait must not deliver a second time.
    for job in jobs {
        assert!(matches!(
            engine.wait(job),
            Err(EngineError::UnknownJob { .. })
        ));
    }
}

#[test]
fn callbacks_never_overlap() {
    let engine = open_engine(6, 3, Some(Duration::from_millis(1)));

    let (done_tx, done_rx) = crossbeam_channel::unbounded();
    let in_callback = Arc::new(AtomicUsize::new(0));
    let in_callback2 = Arc::clone(&in_callback);
    engine.register_callback(move |_| {
        let depth = in_callback2.fetch_add(1, Ordering::SeqCst);
        assert_eq!(depth, 0, "callback invoked concurrently");
        std::thread::sleep(Duration::from_millis(1));
        in_callback2.fetch_sub(1, Ordering::SeqCst);
        done_tx.send(()).expect("send");
        0
    });

    for i in 0..12u8 {
        engine.run_async(&input(i), None).expect("submit");
    }
    for _ in 0..12 {
        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("completion missing");
    }
}

#[test]
fn replacing_callback_discards_previous_registration() {
    let engine = open_engine(2, 1, None);

    let (first_tx, first_rx) = crossbeam_channel::unbounded();
    engine.register_callback(move |_| {
        first_tx.send(()).expect("send");
        0
    });

    let job = engine.run_async(&input(1), None).expect("submit");
    first_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("first callback never fired");
    assert!(matches!(
        engine.wait(job),
        Err(EngineError::UnknownJob { .. })
    ));

    let (second_tx, second_rx) = crossbeam_channel::unbounded();
    engine.register_callback(move |_| {
        second_tx.send(()).expect("send");
        0
    });

    engine.run_async(&input(2), None).expect("submit");
    second_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("second callback never fired");
    assert!(first_rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn close_waits_for_in_flight_jobs() {
    let engine = open_engine(2, 2, Some(Duration::from_millis(100)));

    engine.run_async(&input(1), None).expect("submit");
    engine.run_async(&input(2), None).expect("submit");

    let started = Instant::now();
    engine.close();
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_millis(80),
        "close returned after {elapsed:?}, before the jobs could finish"
    );

    assert!(engine.is_closed());
    assert!(matches!(
        engine.run_async(&input(3), None),
        Err(EngineError::EngineClosed)
    ));
    assert!(matches!(engine.run(&input(3)), Err(EngineError::EngineClosed)));

    // Closing again is a no-op.
    engine.close();
}

#[test]
fn drop_closes_cleanly_with_jobs_in_flight() {
    let engine = open_engine(4, 2, Some(Duration::from_millis(20)));
    for i in 0..4u8 {
        engine.run_async(&input(i), None).expect("submit");
    }
    drop(engine); // must drain and join without hanging
}

#[test]
fn multiple_engines_for_one_model_coexist() {
    let a = open_engine(2, 1, None);
    let b = open_engine(2, 1, None);

    let out_a = a.run(&input(1)).expect("engine a");
    let out_b = b.run(&input(1)).expect("engine b");
    assert_eq!(&out_a[..], &out_b[..]);
}

#[test]
fn benchmark_reports_positive_throughput() {
    let engine = open_engine(4, 3, Some(Duration::from_millis(1)));
    let fps = engine.run_benchmark(16, &input(0)).expect("benchmark");
    assert!(fps > 0.0);
    assert_eq!(engine.latency_count(), 16);
    assert!(engine.latency_mean_us() > 0.0);
}

#[test]
fn open_with_missing_model_fails() {
    let err = InferenceEngine::open("/nonexistent/model.dxnn", EngineOptions::default())
        .err()
        .expect("open should fail");
    assert!(matches!(err, EngineError::ModelLoad { .. }));
}

/// Backend that fails any input whose first byte is 0xFF.
#[derive(Debug)]
struct FlakyBackend {
    inner: SoftwareBackend,
}

impl ComputeBackend for FlakyBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Software
    }

    fn core_count(&self) -> usize {
        self.inner.core_count()
    }

    fn infer(&self, input: &[u8], output: &mut [u8]) -> dxnn_engine::Result<()> {
        if input.first() == Some(&0xFF) {
            return Err(EngineError::inference_failed("injected device fault"));
        }
        self.inner.infer(input, output)
    }
}

fn open_flaky_engine(dispatcher: Arc<dxnn_device::RuntimeEventDispatcher>) -> InferenceEngine {
    let model = test_model();
    let backend = FlakyBackend {
        inner: SoftwareBackend::new(&model),
    };
    InferenceEngine::with_backend(
        model,
        Arc::new(backend),
        EngineOptions::default()
            .with_buffer_count(2)
            .with_cores(1)
            .with_dispatcher(dispatcher),
    )
    .expect("engine open")
}

#[test]
fn failed_job_is_reported_through_wait() {
    let dispatcher = Arc::new(dxnn_device::RuntimeEventDispatcher::new());
    let events = Arc::new(AtomicUsize::new(0));
    let events2 = Arc::clone(&events);
    dispatcher.register_handler(move |event| {
        assert!(event.level >= dxnn_device::EventLevel::Error);
        events2.fetch_add(1, Ordering::SeqCst);
    });

    let engine = open_flaky_engine(dispatcher);

    // Healthy job still works.
    let ok = engine.run(&input(1)).expect("healthy job");
    drop(ok);

    // Faulted job reaches FAILED and wait reports it.
    let job = engine.run_async(&input(0xFF), None).expect("submit");
    let err = engine.wait(job).unwrap_err();
    assert!(matches!(err, EngineError::InferenceFailed { .. }));
    assert_eq!(events.load(Ordering::SeqCst), 1);

    // The failure consumed the job.
    assert!(matches!(
        engine.wait(job),
        Err(EngineError::UnknownJob { .. })
    ));
}

#[test]
fn failed_job_is_reported_through_callback() {
    let engine = open_flaky_engine(Arc::new(dxnn_device::RuntimeEventDispatcher::new()));

    let (done_tx, done_rx) = crossbeam_channel::unbounded();
    engine.register_callback(move |completion| {
        done_tx
            .send(completion.result.err().map(ToString::to_string))
            .expect("send");
        0
    });

    engine.run_async(&input(0xFF), None).expect("submit");
    let failure = done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("callback never fired");
    let message = failure.expect("failure was not reported");
    assert!(message.contains("injected device fault"));
}

#[test]
fn failed_batch_member_fails_the_batch() {
    let engine = open_flaky_engine(Arc::new(dxnn_device::RuntimeEventDispatcher::new()));

    let inputs = vec![input(1), input(0xFF), input(2)];
    let err = engine.run_batch(&inputs).unwrap_err();
    assert!(matches!(err, EngineError::InferenceFailed { .. }));

    // The engine stays usable afterwards.
    let outputs = engine.run_batch(&[input(3), input(4)]).expect("run_batch");
    assert_eq!(outputs.len(), 2);
}
