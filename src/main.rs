// =============================================================================
// EXPORT HANDLE PROBE - minimal allocator-defect reproduction
// =============================================================================
//
// Distinct GPU images allocated from an export-capable memory pool must never
// report the same exported OS handle. Small images sub-allocated into one
// shared memory block do - this program sets up exactly that situation and
// aborts when it observes the aliasing, as evidence for the allocator
// maintainers.
//
// FLOW:
// 1. Parse arguments (adapter pinning, listing, help)
// 2. Load config, init logging
// 3. Setup: device connection + four exportable images (two large, two small)
// 4. Verify: all exported handles pairwise distinct
//
// Exit codes: 0 on success/help/list, -1 on bad arguments, abnormal
// termination (abort) on a setup failure or an aliased handle.
//
// =============================================================================

mod backend;
mod cli;
mod config;
mod scenario;

use cli::Command;
use config::ProbeConfig;

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match cli::parse(&args) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("error: {err}");
            eprintln!("{}", cli::USAGE);
            std::process::exit(-1);
        }
    };

    init_logging();

    match command {
        Command::Help => {
            println!("{}", cli::USAGE);
        }
        Command::ListDevices => match backend::device::list_adapters() {
            Ok(names) => {
                for (id, name) in names.iter().enumerate() {
                    println!("{id} : {name}");
                }
            }
            Err(err) => fail(err),
        },
        Command::Run { device } => {
            let config = ProbeConfig::load();
            log::info!(
                "Probing with two {0}x{0} and two {1}x{1} images",
                config.probe.large_side,
                config.probe.small_side
            );

            if let Err(err) = scenario::run(&config, device) {
                fail(err);
            }
            log::info!("Reproduction scenario completed without aliasing");
        }
    }
}

/// Report a fatal condition and terminate abnormally. The abort is the
/// reproduction's observable failure signal.
fn fail(err: anyhow::Error) -> ! {
    log::error!("{err:#}");
    std::process::abort();
}

fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::from_default_env();
    builder.filter_level(LevelFilter::Info);
    builder.init();
}
