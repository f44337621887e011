//! A fixed-window rate limiter in front of an API.
//!
//! Requests arrive every 0.12 seconds, a little over 8 per second,
//! and land in a waiting queue. The limiter drains that queue but
//! admits at most 500 requests in each aligned 60 second window.
//! Since 500 requests arrive in exactly one window's worth of time,
//! the limiter hits its threshold right at the end of most windows.
//!
//! A sampler records the queue depth once a minute. At the end of the
//! simulated hour, the demo prints that history alongside the request
//! totals and the throttle waits.

use queuesim::config::{IntervalSampler, ModelConfig, Sampler};
use queuesim::{Context, Process, SimState, Simulation, Step, StoreId, Wakeup};
use rand_pcg::Pcg64;

struct Gateway {
    rng: Pcg64,
    submitted: u64,
}

impl SimState for Gateway {}

/// Puts a new request in the queue after every arrival interval.
#[derive(Debug)]
struct Requests {
    queue: StoreId,
    arrivals: IntervalSampler,
}

impl Process<Gateway, u64> for Requests {
    fn resume(
        &mut self,
        _: Wakeup<u64>,
        gateway: &mut Gateway,
        context: &mut Context<'_, Gateway, u64>,
    ) -> queuesim::Result<Step> {
        gateway.submitted += 1;
        context.put(self.queue, gateway.submitted)?;
        Ok(Step::Timeout(self.arrivals.sample(&mut gateway.rng)))
    }
}

fn main() -> queuesim::Result {
    tracing_subscriber::fmt::init();

    let config = ModelConfig::default();
    config.validate()?;

    let gateway = Gateway {
        rng: config.rng(),
        submitted: 0,
    };
    let mut sim = Simulation::new(gateway, 0.0);
    let queue = sim.new_store();
    sim.spawn(Requests {
        queue,
        arrivals: config.arrival.sampler()?,
    })?;
    let limiter = sim.new_rate_limiter(config.window_size, config.max_threshold, queue)?.limiter;
    sim.sample_every(config.window_size)?;
    sim.run_until(config.horizon)?;

    println!("{:>8} {:>12} {:>10}", "time", "queue depth", "in window");
    for snapshot in sim.samples() {
        let depth = snapshot.store(queue).map_or(0, |store| store.depth);
        let in_window = snapshot.limiter(limiter).map_or(0, |limiter| limiter.count_in_window);
        println!("{:>8.0} {depth:>12} {in_window:>10}", snapshot.time);
    }

    let Some(limiter) = sim.limiter(limiter) else {
        return Ok(());
    };
    let stats = limiter.stats();
    println!();
    println!("Requests Submitted: {}", sim.state().submitted);
    println!("Requests Processed: {}", stats.processed);
    println!("Rate Exceeded Count: {}", stats.throttle_waits.len());
    if let Some(mean) = stats.mean_throttle_wait() {
        println!("Avg Wait Time: {mean:.3}");
    }
    Ok(())
}
