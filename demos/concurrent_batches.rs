//! Batches of concurrent tasks, each batch waiting for all of its
//! tasks before the next one starts.
//!
//! A batch holds `ceil(x)` tasks for `x` drawn from an exponential
//! distribution with mean ten. Every task in a batch starts at the
//! same instant and runs for a whole number of seconds. The batch is
//! over once its slowest task is done.
//!
//! The demo runs for one simulated hour and then prints how many
//! batches and tasks completed and how long the average batch took.
//! Set `RUST_LOG=info` to follow each task.

use queuesim::config::{Interval, IntervalSampler, Sampler};
use queuesim::{Context, Process, ProcessId, SimState, Simulation, Step, Wakeup};
use rand::SeedableRng;
use rand_pcg::Pcg64;
use tracing::info;

const HORIZON: f64 = 3600.0;

struct Workload {
    rng: Pcg64,
    batch_sizes: IntervalSampler,
    task_times: IntervalSampler,
    tasks_started: u64,
    tasks_finished: u64,
    batch_times: Vec<f64>,
}

impl SimState for Workload {}

/// Starts one batch after another.
#[derive(Debug, Default)]
struct Batches {
    started_at: f64,
    size: usize,
}

impl Batches {
    fn start_batch(
        &mut self,
        workload: &mut Workload,
        context: &mut Context<'_, Workload, ()>,
    ) -> queuesim::Result<Step> {
        self.started_at = context.now();
        self.size = workload.batch_sizes.sample(&mut workload.rng).ceil().max(1.0) as usize;

        let mut tasks: Vec<ProcessId> = Vec::with_capacity(self.size);
        for _ in 0..self.size {
            workload.tasks_started += 1;
            let duration = workload.task_times.sample(&mut workload.rng).ceil();
            tasks.push(context.spawn(Task {
                number: workload.tasks_started,
                duration,
            })?);
        }
        Ok(Step::AwaitAll(tasks))
    }
}

impl Process<Workload, ()> for Batches {
    fn resume(
        &mut self,
        wakeup: Wakeup<()>,
        workload: &mut Workload,
        context: &mut Context<'_, Workload, ()>,
    ) -> queuesim::Result<Step> {
        if let Wakeup::Joined = wakeup {
            let elapsed = context.now() - self.started_at;
            println!("Finished batch with {} tasks after {elapsed}", self.size);
            workload.batch_times.push(elapsed);
        }
        self.start_batch(workload, context)
    }
}

#[derive(Debug)]
struct Task {
    number: u64,
    duration: f64,
}

impl Process<Workload, ()> for Task {
    fn resume(
        &mut self,
        wakeup: Wakeup<()>,
        workload: &mut Workload,
        context: &mut Context<'_, Workload, ()>,
    ) -> queuesim::Result<Step> {
        match wakeup {
            Wakeup::Started => {
                info!("starting task {}", self.number);
                Ok(Step::Timeout(self.duration))
            },
            _ => {
                info!("finished task {}", self.number);
                workload.tasks_finished += 1;
                Ok(Step::Finish)
            },
        }
    }
}

fn main() -> queuesim::Result {
    tracing_subscriber::fmt::init();

    let workload = Workload {
        rng: Pcg64::seed_from_u64(0x7a5c),
        batch_sizes: Interval::Exponential { mean: 10.0 }.sampler()?,
        task_times: Interval::Exponential { mean: 3.0 }.sampler()?,
        tasks_started: 0,
        tasks_finished: 0,
        batch_times: Vec::new(),
    };
    let mut sim = Simulation::new(workload, 0.0);
    sim.spawn(Batches::default())?;
    sim.run_until(HORIZON)?;

    let workload = sim.into_state();
    let batches = workload.batch_times.len();
    println!();
    println!("Batches completed: {batches}");
    println!("Tasks started: {}, finished: {}", workload.tasks_started, workload.tasks_finished);
    if batches > 0 {
        let mean = workload.batch_times.iter().sum::<f64>() / batches as f64;
        println!("Mean batch duration: {mean:.2}");
    }
    Ok(())
}
