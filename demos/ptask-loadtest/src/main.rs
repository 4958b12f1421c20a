//! Three periodic tasks with doubling periods (1, 2, 4 seconds), each
//! occupying the CPU for 300 ms per cycle. Runs for a fixed duration, then
//! reports each task's WCET, miss count, and next scheduled activation.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use ptask_core::{Runtime, TaskAttr};
use ptask_host_std::StdHost;

/// Base priority for this workspace's user tasks.
const MAX_USER_PRIO: u16 = 101;

#[derive(Parser)]
#[command(about = "Three periodic tasks with doubling periods")]
struct Args {
    /// How many tasks to create.
    #[arg(long, default_value_t = 3)]
    tasks: u32,

    /// How long to run before reporting and exiting.
    #[arg(long, default_value_t = 10)]
    duration_secs: u64,

    /// Milliseconds of CPU occupied per cycle by each task's body.
    #[arg(long, default_value_t = 300)]
    busy_ms: u64,

    /// Tick rate of the host clock, in ticks per second.
    #[arg(long, default_value_t = 1000)]
    rate_hz: u64,
}

/// Busy-wait for approximately `ms` milliseconds of wall time: a tight
/// polling loop on the tick counter rather than a sleep, so the task
/// genuinely occupies the CPU.
fn busy_wait_ms(rt: &Arc<Runtime<StdHost>>, ms: u64) {
    let rate_hz = rt.host().rate_hz();
    let deadline = rt.host().now() + TaskAttr::ms_to_ticks(rate_hz, ms as u32);
    while rt.host().now() < deadline {
        std::hint::spin_loop();
    }
}

fn main() {
    env_logger::init();
    if let Err(err) = main_inner() {
        log::error!("{err:?}");
        std::process::exit(1);
    }
}

fn main_inner() -> anyhow::Result<()> {
    let args = Args::parse();
    let rt = Runtime::new(StdHost::new(args.rate_hz));

    let mut handles = Vec::with_capacity(args.tasks as usize);
    for i in 0..args.tasks {
        let period_ms = 1000u32 * 2u32.pow(i);
        let name = format!("task{i}");
        let attr = TaskAttr::new(&name, 1024 * 1024, MAX_USER_PRIO + i as u16, period_ms, period_ms)?;
        let busy_ms = args.busy_ms;

        let handle = rt.task_create(&name, attr, (), move |rt, ()| {
            if rt.wait_for_activation().is_err() {
                return;
            }
            loop {
                busy_wait_ms(rt, busy_ms);
                if rt.wait_for_period().is_err() {
                    return;
                }
            }
        })?;
        log::info!("created {name} with period {period_ms}ms");
        handles.push(handle);
    }

    std::thread::sleep(Duration::from_secs(args.duration_secs));

    for handle in handles {
        match rt.task_attr(handle) {
            Ok(attr) => {
                println!(
                    "{}: wcet_us={} miss_count={} next_activation_tick={}",
                    attr.name(),
                    attr.wcet_us(),
                    attr.miss_count(),
                    attr.next_activation_tick(),
                );
            }
            Err(status) => println!("<task gone: {status}>"),
        }
    }

    Ok(())
}
