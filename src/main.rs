use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use rrr::cli::Cli;
use rrr::config::InstanceConfig;
use rrr::init::RrrEnv;
use rrr::instance::{DeadendInstance, Instance, InstanceContext};

use rrr_broker::Broker;
use rrr_event::EventQueue;

fn build_instance(cfg: &InstanceConfig) -> Option<Arc<dyn Instance>> {
    match cfg.kind.as_str() {
        "deadend" => {
            let customer = cfg.customer.clone().unwrap_or_else(|| format!("{}_in", cfg.name));
            Some(Arc::new(DeadendInstance::new(cfg.name.clone(), customer)))
        }
        other => {
            log::warn!("unknown instance kind '{other}' for instance '{}', skipping", cfg.name);
            None
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let env = match RrrEnv::load(&cli.config) {
        Ok(env) => env,
        Err(err) => {
            eprintln!("could not load configuration: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = env.init_logging() {
        eprintln!("could not initialize logging: {err}");
        std::process::exit(1);
    }
    match cli.verbose {
        0 => {}
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let config = env.into_config();
    let ratelimit = rrr_broker::RatelimitParams {
        threshold: config.ratelimit_threshold(),
        release: config.ratelimit_release(),
    };
    let broker = Arc::new(Broker::with_ratelimit(ratelimit));
    let stop = Arc::new(AtomicBool::new(false));

    let mut selected: Vec<&InstanceConfig> = config
        .instances()
        .iter()
        .filter(|inst| cli.allows(&inst.name))
        .collect();
    selected.sort_by_key(|inst| inst.start_priority);

    let mut handles = Vec::new();
    for inst_cfg in selected {
        let Some(instance) = build_instance(inst_cfg) else {
            continue;
        };

        let events = match EventQueue::new() {
            Ok(queue) => Arc::new(queue),
            Err(err) => {
                log::error!("could not create event loop for instance '{}': {err}", inst_cfg.name);
                continue;
            }
        };

        let ctx = InstanceContext {
            name: inst_cfg.name.clone(),
            broker: broker.clone(),
            events,
            stop: stop.clone(),
        };

        if let Err(err) = instance.preload(&ctx) {
            log::error!("preload failed for instance '{}': {err}", inst_cfg.name);
            continue;
        }

        log::info!("starting instance '{}' ({:?})", inst_cfg.name, instance.kind());
        let handle = std::thread::spawn(move || {
            instance.thread_entry(&ctx);
        });
        handles.push(handle);
    }

    if handles.is_empty() {
        log::warn!("no instances started; check config.toml's [[instance]] tables");
    }

    let _ = tokio::signal::ctrl_c().await;
    log::info!("shutdown signal received, stopping instances");
    stop.store(true, Ordering::SeqCst);

    for handle in handles {
        let _ = handle.join();
    }
}
