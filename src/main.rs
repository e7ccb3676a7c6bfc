//! The streamedge server binary: loads configuration, starts the process
//! logger and statistics log, then brings up the WebRTC publisher and waits.

use std::sync::Arc;
use std::time::Duration;
use std::{env, process, thread};

use streamedge::config::{Config, PublisherConfig};
use streamedge::log::log_sink::LogSink;
use streamedge::log::logger::Logger;
use streamedge::publisher::RtcPublisher;
use streamedge::stats::StatLog;

fn main() {
    let args: Vec<String> = env::args().collect();
    let config = if args.len() > 1 {
        let path = &args[1];
        match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config {path}: {e}");
                process::exit(1);
            }
        }
    } else {
        Config::load("streamedge.conf").unwrap_or_else(|_| Config::empty())
    };

    let publisher_config = match PublisherConfig::from_config(&config) {
        Ok(publisher_config) => publisher_config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            process::exit(1);
        }
    };

    let logger = Logger::start_default("streamedge", 1024);
    let log_sink: Arc<dyn LogSink> = Arc::new(logger.handle());
    let stats = Arc::new(StatLog::start_in_dir("logs", "streamedge", 256));

    eprintln!(
        "[streamedge] starting on {} (log: {})",
        publisher_config.bind_ip,
        logger.file_path().display()
    );

    let publisher = RtcPublisher::new(publisher_config, log_sink, stats);
    publisher.create_application("default", None);
    if let Err(e) = publisher.start() {
        eprintln!("[streamedge] publisher failed to start: {e}");
        process::exit(1);
    }

    // Media ingest and the WebSocket layer attach through the library API;
    // the binary just keeps the process alive.
    loop {
        thread::sleep(Duration::from_secs(60));
    }
}
