use std::io::{self, BufRead};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use anyhow::Result;
use clap::Parser;
use crossbeam_channel::Sender;
use shakmaty::{CastlingMode, Move};

use scoutfish::config::{MAX_HASH_LOG2_SIZE, MAX_STRENGTH, SearchConfig};
use scoutfish::position::SearchPosition;
use scoutfish::search::{PvInfo, SearchListener, SearchSession};
use scoutfish::uci::{self, UciCommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Negascout chess engine speaking UCI", long_about = None)]
struct Args {
    /// Transposition table size as log2 of the entry count
    #[arg(long, default_value_t = 20)]
    hash: u32,

    /// Playing strength from 0 to 1000
    #[arg(long, default_value_t = 1000)]
    strength: u32,

    /// Seed for the weak-play random choices
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Search depth used when "go" names no limit
    #[arg(long, default_value_t = 100)]
    depth: i32,

    /// Log every root move and per-ply node counts
    #[arg(short, long)]
    verbose: bool,

    /// Debug logging to stderr
    #[arg(long)]
    debug: bool,
}

/// Prints search reports as UCI `info` lines.
struct UciListener;

impl SearchListener for UciListener {
    fn notify_depth(&mut self, depth: i32) {
        println!("info depth {depth}");
    }

    fn notify_curr_move(&mut self, m: &Move, move_nr: usize) {
        println!("info currmove {} currmovenumber {move_nr}", m.to_uci(CastlingMode::Standard));
    }

    fn notify_pv(&mut self, info: &PvInfo) {
        println!("{}", uci::format_pv_info(info));
    }

    fn notify_stats(&mut self, nodes: u64, nps: u64, time_ms: u64) {
        println!("info nodes {nodes} nps {nps} time {time_ms}");
    }
}

fn main() {
    let args = Args::parse();

    let level = if args.debug { "debug" } else if args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, level))
        .target(env_logger::Target::Stderr)
        .write_style(env_logger::WriteStyle::Never)
        .init();

    if let Err(e) = run(args) {
        log::error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = SearchConfig {
        hash_log2_size: args.hash.clamp(1, MAX_HASH_LOG2_SIZE),
        strength: args.strength.min(MAX_STRENGTH),
        random_seed: args.seed,
        verbose: args.verbose,
        ..SearchConfig::default()
    };
    let mut session = SearchSession::new(config.clone());
    session.set_listener(Box::new(UciListener));

    let (tx, rx) = crossbeam_channel::unbounded();
    let stop = session.stop_handle();
    let reader = spawn_stdin_reader(tx, Arc::clone(&stop));
    let mut pos = SearchPosition::default();

    for cmd in rx.iter() {
        match cmd {
            UciCommand::Uci => {
                println!("id name scoutfish {}", env!("CARGO_PKG_VERSION"));
                println!("id author the scoutfish developers");
                println!("option name Hash type spin default 20 min 1 max {MAX_HASH_LOG2_SIZE}");
                println!("option name Strength type spin default 1000 min 0 max {MAX_STRENGTH}");
                println!("option name Seed type string default 0");
                println!("uciok");
            }
            UciCommand::IsReady => println!("readyok"),
            UciCommand::UciNewGame => {
                session.new_game();
                pos = SearchPosition::default();
            }
            UciCommand::Position { fen, moves } => match uci::build_position(fen.as_deref(), &moves) {
                Ok(p) => pos = p,
                Err(e) => log::warn!("rejected position: {e}"),
            },
            UciCommand::SetOption { name, value } => {
                let old_hash = config.hash_log2_size;
                match config.set_option(&name, &value) {
                    Ok(()) => {
                        if config.hash_log2_size != old_hash {
                            session.resize_tt(config.hash_log2_size);
                        }
                        session.set_strength(config.strength, config.random_seed);
                    }
                    Err(e) => log::warn!("{e}"),
                }
            }
            UciCommand::Go(params) => {
                stop.store(false, Ordering::Relaxed);
                session.set_position(pos.clone());
                match params.time_budget(pos.turn()) {
                    Some((min, max)) => session.time_limit(min, max),
                    None => session.clear_time_limit(),
                }
                let depth = params.depth.unwrap_or(args.depth);
                match session.search(depth, params.nodes) {
                    Some(m) => println!("bestmove {}", m.to_uci(CastlingMode::Standard)),
                    None => println!("bestmove 0000"),
                }
            }
            // The reader thread already raised the stop flag.
            UciCommand::Stop => {}
            UciCommand::Quit => break,
            UciCommand::Unknown(line) => log::warn!("unknown command: {line}"),
        }
    }

    drop(rx);
    if reader.is_finished() {
        reader.join().map_err(|_| anyhow::anyhow!("stdin reader panicked"))?;
    }
    Ok(())
}

/// Reads stdin on its own thread so that `stop` reaches a running search.
fn spawn_stdin_reader(tx: Sender<UciCommand>, stop: Arc<AtomicBool>) -> JoinHandle<()> {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    log::error!("failed to read stdin: {e}");
                    break;
                }
            };
            let Some(cmd) = UciCommand::parse(&line) else { continue };
            log::debug!("received: {}", line.trim());
            if cmd.interrupts_search() {
                stop.store(true, Ordering::Relaxed);
            }
            if tx.send(cmd).is_err() {
                return;
            }
        }
        let _ = tx.send(UciCommand::Quit);
    })
}
