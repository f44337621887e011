use queuesim::config::{Interval, IntervalSampler, Sampler};
use queuesim::rate_limiter::LimiterId;
use queuesim::{Context, Process, SimState, Simulation, Step, StoreId, Wakeup};
use rand::SeedableRng;
use rand_pcg::Pcg64;

/// A registration site with a waiting room in front of it.
struct Site {
    rng: Pcg64,
    submitted: u32,
    registered: Vec<(f64, u32)>,
}

impl SimState for Site {}

/// Candidates show up and enter the waiting room.
#[derive(Debug)]
struct Candidates {
    waiting_room: StoreId,
    arrivals: IntervalSampler,
}

impl Process<Site, u32> for Candidates {
    fn resume(
        &mut self,
        _: Wakeup<u32>,
        site: &mut Site,
        context: &mut Context<'_, Site, u32>,
    ) -> queuesim::Result<Step> {
        context.put(self.waiting_room, site.submitted)?;
        site.submitted += 1;
        Ok(Step::Timeout(self.arrivals.sample(&mut site.rng)))
    }
}

/// Registers every candidate let out of the waiting room.
#[derive(Debug)]
struct Registration {
    admitted: StoreId,
}

impl Process<Site, u32> for Registration {
    fn resume(
        &mut self,
        wakeup: Wakeup<u32>,
        site: &mut Site,
        context: &mut Context<'_, Site, u32>,
    ) -> queuesim::Result<Step> {
        if let Some(candidate) = wakeup.into_item() {
            site.registered.push((context.now(), candidate));
        }
        Ok(Step::Get(self.admitted))
    }
}

struct Pipeline {
    sim: Simulation<Site, u32>,
    waiting_room: StoreId,
    limiter: LimiterId,
}

fn pipeline(seed: u64, arrivals: Interval, window_size: f64, max_threshold: usize) -> Pipeline {
    let site = Site {
        rng: Pcg64::seed_from_u64(seed),
        submitted: 0,
        registered: Vec::new(),
    };
    let mut sim = Simulation::new(site, 0.0);
    let waiting_room = sim.new_store();
    let admitted = sim.new_store();
    sim.spawn(Candidates {
        waiting_room,
        arrivals: arrivals.sampler().unwrap(),
    })
    .unwrap();
    let limiter = sim
        .new_rate_limiter_into(window_size, max_threshold, waiting_room, admitted)
        .unwrap()
        .limiter;
    sim.spawn(Registration { admitted }).unwrap();

    Pipeline {
        sim,
        waiting_room,
        limiter,
    }
}

/// Number of registrations per window, keyed by the window's index. A wake-up from a throttle wait can land a
/// rounding error short of the boundary, so times that close count towards the next window.
fn per_window(registered: &[(f64, u32)], window_size: f64) -> Vec<(u64, usize)> {
    let mut counts: Vec<(u64, usize)> = Vec::new();
    for (time, _) in registered {
        let window = (time / window_size + 1e-9).floor() as u64;
        match counts.last_mut() {
            Some((last, count)) if *last == window => *count += 1,
            _ => counts.push((window, 1)),
        }
    }
    counts
}

#[test]
fn overloaded_waiting_room_lets_out_a_full_window_at_a_time() {
    let Pipeline {
        mut sim,
        waiting_room,
        limiter,
    } = pipeline(0, Interval::Fixed(2.0), 60.0, 10);
    sim.run_until(600.0).unwrap();

    let windows = per_window(&sim.state().registered, 60.0);
    assert_eq!(11, windows.len());
    assert!(windows.iter().all(|(_, count)| *count == 10), "{windows:?}");

    let stats = sim.limiter(limiter).unwrap().stats();
    assert_eq!(110, stats.processed);
    assert_eq!(10, stats.max_in_window);
    assert_eq!(40.0, stats.throttle_waits[0]);
    assert!(stats.throttle_waits[1..].iter().all(|wait| *wait == 60.0));

    // nothing lost: one candidate is held by the limiter while it waits out the last window
    let still_waiting = sim.store(waiting_room).unwrap().len() as u32;
    assert_eq!(301, sim.state().submitted);
    assert_eq!(sim.state().submitted, 110 + still_waiting + 1);
}

#[test]
fn candidates_leave_in_arrival_order() {
    let Pipeline { mut sim, .. } = pipeline(3, Interval::Exponential { mean: 1.5 }, 30.0, 12);
    sim.run_until(900.0).unwrap();

    let order: Vec<u32> = sim.state().registered.iter().map(|(_, candidate)| *candidate).collect();
    let expected: Vec<u32> = (0..order.len() as u32).collect();
    assert_eq!(expected, order);
}

#[test]
fn no_window_exceeds_the_threshold() {
    for seed in [1, 2, 3, 4, 5] {
        let Pipeline { mut sim, limiter, .. } = pipeline(seed, Interval::Exponential { mean: 0.5 }, 10.0, 7);
        sim.run_until(500.0).unwrap();

        for (window, count) in per_window(&sim.state().registered, 10.0) {
            assert!(count <= 7, "window {window} admitted {count} with seed {seed}");
        }
        assert!(sim.limiter(limiter).unwrap().stats().max_in_window <= 7);
    }
}

#[test]
fn throttled_candidates_are_admitted_exactly_at_window_boundaries() {
    let Pipeline { mut sim, limiter, .. } = pipeline(8, Interval::Uniform { low: 0.5, high: 1.5 }, 20.0, 5);
    sim.run_until(400.0).unwrap();

    let registered = &sim.state().registered;
    let throttles = sim.limiter(limiter).unwrap().stats().throttle_waits.len();
    assert!(throttles > 0, "arrivals should outpace the limiter");

    let on_boundary = |time: f64| ((time / 20.0).round() * 20.0 - time).abs() < 1e-9;
    let boundary_admissions = registered.iter().filter(|(time, _)| on_boundary(*time)).count();
    assert!(
        boundary_admissions >= throttles - 1,
        "{boundary_admissions} admissions on a boundary for {throttles} throttles"
    );
}

#[test]
fn quiet_waiting_room_never_throttles() {
    let Pipeline { mut sim, limiter, .. } = pipeline(0, Interval::Fixed(10.0), 60.0, 10);
    sim.run_until(3600.0).unwrap();

    let limiter = sim.limiter(limiter).unwrap();
    assert!(limiter.stats().throttle_waits.is_empty());
    assert_eq!(None, limiter.stats().mean_throttle_wait());
    assert_eq!(361, limiter.stats().processed);
    let registered = &sim.state().registered;
    assert!(registered.iter().all(|(time, candidate)| *time == *candidate as f64 * 10.0));
}
