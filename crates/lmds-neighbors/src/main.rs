use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "lmds-neighbors")]
#[command(about = "Fill the neighbor and rank blocks of a shared memory neighbor store")]
#[command(version)]
struct Args {
    /// System V shared memory key of the segment
    #[arg(allow_hyphen_values = true)]
    key: i32,

    /// Size of the segment in bytes
    size: usize,

    /// Log level (debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("PANIC: neighbor computation panicked");
        eprintln!(
            "  Location: {}",
            panic_info
                .location()
                .map(|l| l.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        );
        eprintln!(
            "  Message: {}",
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| panic_info.payload().downcast_ref::<String>().map(String::as_str))
                .unwrap_or("<no message>")
        );
    }));

    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout is reserved for diagnostics the caller forwards to its own log
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("lmds-neighbors: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(unix)]
fn run(args: &Args) -> lmds_core::Result<()> {
    use lmds_core::neighbors::fill_neighbor_blocks;
    use lmds_core::neighbors::shm::SharedSegment;
    use std::time::Instant;

    let start = Instant::now();
    info!(key = args.key, size = args.size, "Attaching shared memory segment");
    let mut segment = SharedSegment::attach(args.key as libc::key_t, args.size)?;

    let header = fill_neighbor_blocks(segment.as_mut_slice())?;
    drop(segment);

    println!(
        "computed {} neighbor rows ({} dimensions, {}) in {} ms",
        header.point_count,
        header.dimensions,
        header.metric,
        start.elapsed().as_millis()
    );
    Ok(())
}

#[cfg(not(unix))]
fn run(_args: &Args) -> lmds_core::Result<()> {
    Err(lmds_core::LmdsError::SharedMemory(
        "System V shared memory is not available on this platform".to_string(),
    ))
}
