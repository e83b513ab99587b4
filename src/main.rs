use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use log::{error, info};

use beamrec::cli::{Args, Config, PortSpec};
use beamrec::error::Result;
use beamrec::ring::SharedRing;
use beamrec::session::Session;
use beamrec::{consumer, producer, signals};

fn main() -> ExitCode {
    init_logging();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("beamrec: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    // --verbose raises the filter after Config is parsed; start at info so
    // argument-parsing errors are still visible.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn run() -> Result<()> {
    let args = Args::parse();
    let cfg = Config::from_args(args)?;
    if cfg.verbose {
        log::set_max_level(log::LevelFilter::Debug);
    }

    if let Some(start) = cfg.start {
        wait_until(start);
    }

    let port_numbers: Vec<u16> = match &cfg.ports {
        PortSpec::Ports(ports) => ports.clone(),
        PortSpec::Stdin => vec![0],
    };
    let portlist = match &cfg.ports {
        PortSpec::Ports(ports) => ports.iter().map(u16::to_string).collect::<Vec<_>>().join("_"),
        PortSpec::Stdin => "stdin".to_string(),
    };
    let hostname = beamrec::filename::hostname();

    let session = Arc::new(Session::new(&port_numbers));
    let ring = Arc::new(SharedRing::create(cfg.bufsize as usize)?);
    let cfg = Arc::new(cfg);

    signals::install(session.clone(), cfg.end, cfg.duration)?;

    info!("beamrec starting, ring capacity {} bytes", ring.capacity());

    let producer_handle = {
        let cfg = cfg.clone();
        let session = session.clone();
        let ring = ring.clone();
        thread::spawn(move || -> Result<()> {
            match &cfg.ports {
                PortSpec::Ports(_) => producer::run_sockets(&cfg, &session, &ring),
                PortSpec::Stdin => producer::run_stdin(&cfg, &session, &ring),
            }
        })
    };

    let consumer_result = consumer::run(&cfg, &session, &ring, &portlist, &hostname);

    // The producer only returns once `stopped == TERMINATE`; give it a
    // grace period to notice, then stop waiting so a wedged socket read
    // can't hang shutdown forever.
    let deadline = Duration::from_secs(1);
    let joined = {
        let start = std::time::Instant::now();
        loop {
            if producer_handle.is_finished() {
                break true;
            }
            if start.elapsed() >= deadline {
                break false;
            }
            thread::sleep(Duration::from_millis(20));
        }
    };
    if joined {
        match producer_handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!("producer: {err}"),
            Err(_) => error!("producer thread panicked"),
        }
    } else {
        error!("producer did not stop within grace period, exiting without join");
    }

    consumer_result
}

fn wait_until(start: chrono::DateTime<Utc>) {
    loop {
        let now = Utc::now();
        if now >= start {
            return;
        }
        let remaining = (start - now).to_std().unwrap_or(Duration::from_millis(100));
        thread::sleep(remaining.min(Duration::from_secs(1)));
    }
}
