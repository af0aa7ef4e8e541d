use std::{
    error::Error,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Instant,
};

use clap::Parser;
use log::{info, warn};

use pipeline_monitor::{
    app::App, produce_current_snapshot, ui, BufferSet, Cli, MonitorConfig, SharedBuffers,
    TickProducer,
};

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_filter()))
        .init();

    let config = cli.to_config()?;
    info!("starting with {config:?}");

    let buffers = BufferSet::from_config(&config)?.into_shared();
    let mut producer = TickProducer::new(&config, Arc::clone(&buffers));
    if config.prefill {
        producer.prefill();
    }

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::Release))?;
    }

    if cli.headless {
        return run_headless(producer, &buffers, &config, cli.ticks, &stop);
    }

    let handle = producer.spawn(Arc::clone(&stop))?;
    let res = ui::run(App::new(Arc::clone(&buffers), config.interval()), &stop);

    if handle.join().is_err() {
        warn!("tick producer panicked");
    }
    res?;
    Ok(())
}

// Tick on the main thread and print the final snapshot as JSON
fn run_headless(
    mut producer: TickProducer,
    buffers: &SharedBuffers,
    config: &MonitorConfig,
    ticks: u64,
    stop: &AtomicBool,
) -> Result<(), Box<dyn Error>> {
    let interval = config.interval();
    for n in 0..ticks {
        if stop.load(Ordering::Acquire) {
            info!("interrupted after {n} ticks");
            break;
        }
        let started = Instant::now();
        producer.tick();
        if n + 1 < ticks {
            thread::sleep(interval.saturating_sub(started.elapsed()));
        }
    }

    println!("{}", produce_current_snapshot(buffers).to_json()?);
    Ok(())
}
