//! A walk-in clinic where patients queue for a nurse.
//!
//! Patients arrive with exponentially distributed gaps averaging five
//! minutes, and each consultation takes an exponentially distributed
//! six minutes on average. With a single nurse on shift the clinic is
//! overloaded, so the line tends to grow through the two-hour session.
//!
//! The model is replicated ten times with independent random streams,
//! and the running average of the mean wait is printed after each run.
//! Set `RUST_LOG=debug` to watch every grant as it happens.

use queuesim::config::{Interval, IntervalSampler, ModelConfig, Sampler};
use queuesim::{Context, Process, ResourceId, SimState, Simulation, Step, Wakeup};
use rand_pcg::Pcg64;
use tracing::info;

const RUNS: u64 = 10;

struct Clinic {
    rng: Pcg64,
    arrivals: IntervalSampler,
    consults: IntervalSampler,
    next_patient: u32,
    waits: Vec<f64>,
}

impl SimState for Clinic {}

/// Sends patients in until the clinic closes.
#[derive(Debug)]
struct Arrivals {
    nurses: ResourceId,
}

impl Process<Clinic, ()> for Arrivals {
    fn resume(
        &mut self,
        _: Wakeup<()>,
        clinic: &mut Clinic,
        context: &mut Context<'_, Clinic, ()>,
    ) -> queuesim::Result<Step> {
        clinic.next_patient += 1;
        context.spawn(Patient {
            id: clinic.next_patient,
            nurses: self.nurses,
            arrived_at: context.now(),
        })?;
        Ok(Step::Timeout(clinic.arrivals.sample(&mut clinic.rng)))
    }
}

#[derive(Debug)]
struct Patient {
    id: u32,
    nurses: ResourceId,
    arrived_at: f64,
}

impl Process<Clinic, ()> for Patient {
    fn resume(
        &mut self,
        wakeup: Wakeup<()>,
        clinic: &mut Clinic,
        context: &mut Context<'_, Clinic, ()>,
    ) -> queuesim::Result<Step> {
        match wakeup {
            Wakeup::Started => {
                info!("patient {} started waiting for a nurse at {:.2}", self.id, context.now());
                Ok(Step::Request(self.nurses))
            },
            Wakeup::Granted(_) => {
                let wait = context.now() - self.arrived_at;
                info!("patient {} finished waiting at {:.2}", self.id, context.now());
                clinic.waits.push(wait);
                Ok(Step::Timeout(clinic.consults.sample(&mut clinic.rng)))
            },
            _ => {
                context.release(self.nurses)?;
                Ok(Step::Finish)
            },
        }
    }
}

/// Run one replication and return the mean wait for a nurse.
fn replicate(config: &ModelConfig, run: u64) -> queuesim::Result<f64> {
    let clinic = Clinic {
        rng: config.rng_for_run(run),
        arrivals: config.arrival.sampler()?,
        consults: config.service.sampler()?,
        next_patient: 0,
        waits: Vec::new(),
    };
    let mut sim = Simulation::new(clinic, 0.0);
    let nurses = sim.new_resource(config.capacity)?;
    sim.spawn(Arrivals { nurses })?;
    sim.run_until(config.horizon)?;

    let waits = &sim.state().waits;
    if waits.is_empty() {
        return Ok(0.0);
    }
    Ok(waits.iter().sum::<f64>() / waits.len() as f64)
}

fn main() -> queuesim::Result {
    tracing_subscriber::fmt::init();

    let config = ModelConfig {
        horizon: 120.0,
        capacity: 1,
        arrival: Interval::Exponential { mean: 5.0 },
        service: Interval::Exponential { mean: 6.0 },
        ..ModelConfig::default()
    };
    config.validate()?;

    let mut mean_waits = Vec::new();
    for run in 0..RUNS {
        println!("Run {} of {RUNS} ----------------------------------------", run + 1);
        mean_waits.push(replicate(&config, run)?);
        let average = mean_waits.iter().sum::<f64>() / mean_waits.len() as f64;
        println!("The average time spent waiting for a nurse is {average:.2} minutes.");
    }
    Ok(())
}
