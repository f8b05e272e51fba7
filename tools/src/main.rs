//! sim-runner: headless runner for the wiregrid simulation.
//!
//! Usage:
//!   sim-runner --seed 12345 --level 1 --ticks 600 --layout layout.json --db run.db
//!   sim-runner --seed 12345 --level 3 --ipc-mode
//!
//! A layout file is a JSON array of topology edits applied before the
//! first tick, e.g. `[{"op":"connect","from":"A","from_port":0,"to":"B","to_port":0}]`.

use anyhow::{Context, Result};
use std::env;
use std::io::{self, BufRead, Write};
use wiregrid_core::{
    command::{PlayerCommand, QueuedCommand, TopologyEdit},
    config::SimConfig,
    engine::SimEngine,
    frame::RenderFrame,
    store::SimStore,
    types::NodeId,
    world::LevelOutcome,
};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    GetState,
    Tick {
        count: u64,
    },
    Rewind {
        count: u64,
    },
    Connect {
        from: NodeId,
        from_port: usize,
        to: NodeId,
        to_port: usize,
        #[serde(default)]
        replace: bool,
    },
    Command {
        payload: PlayerCommand,
    },
    Save,
    Quit,
}

#[derive(serde::Serialize)]
struct UiState {
    run_id: String,
    paused: bool,
    held: bool,
    ticks_per_frame: u32,
    frame: RenderFrame,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let level = parse_arg(&args, "--level", 1u32);
    let ticks = parse_arg(&args, "--ticks", 600u64);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let data_dir = flag_value(&args, "--data-dir").unwrap_or("./data");
    let layout = flag_value(&args, "--layout");

    if !ipc_mode {
        println!("wiregrid sim-runner");
        println!("  seed:      {seed}");
        println!("  level:     {level}");
        println!("  ticks:     {ticks}");
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!();
    }

    let config = SimConfig::load(data_dir)?;
    let store = SimStore::open(db)?;
    store.migrate()?;

    let run_id = format!("run-{seed}-L{level}-{}", chrono::Utc::now().format("%Y%m%dT%H%M%S"));
    store.insert_run(&run_id, seed, level, env!("CARGO_PKG_VERSION"))?;

    let mut engine = SimEngine::build(run_id.clone(), seed, config, level, store)?;

    if let Some(path) = layout {
        apply_layout(&mut engine, path)?;
    }

    if ipc_mode {
        run_ipc_loop(&mut engine)?;
    } else {
        engine.run_ticks(ticks)?;
        print_summary(&engine, ticks)?;
    }

    Ok(())
}

fn apply_layout(engine: &mut SimEngine, path: &str) -> Result<()> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Cannot read {path}"))?;
    let edits: Vec<TopologyEdit> =
        serde_json::from_str(&content).with_context(|| format!("Cannot parse {path}"))?;
    for edit in edits {
        engine.apply_edit(edit)?;
    }
    log::info!("layout {path} applied: {} wires", engine.world().network.connections().count());
    Ok(())
}

fn run_ipc_loop(engine: &mut SimEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };

        // Rejected edits and failed purchases are reported, not fatal.
        let outcome: Result<()> = match cmd {
            IpcCommand::Quit => break,
            IpcCommand::GetState => Ok(()),
            IpcCommand::Tick { count } => {
                let frames = u64::from(engine.clock.ticks_per_frame());
                engine.run_ticks(count * frames).map_err(Into::into)
            }
            IpcCommand::Rewind { count } => engine.rewind_ticks(count).map_err(Into::into),
            IpcCommand::Connect { from, from_port, to, to_port, replace } => engine
                .apply_edit(TopologyEdit::Connect { from, from_port, to, to_port, replace })
                .map(|_| ())
                .map_err(Into::into),
            IpcCommand::Command { payload } => {
                let queued = QueuedCommand {
                    run_id:     engine.run_id.clone(),
                    queued_at:  engine.clock.current_tick,
                    command_id: uuid::Uuid::new_v4().to_string(),
                    command:    payload,
                };
                engine.submit(queued).map(|_| ()).map_err(Into::into)
            }
            IpcCommand::Save => engine.save_snapshot().map_err(Into::into),
        };

        let state = build_ui_state(engine, outcome.err().map(|e| e.to_string()));
        writeln!(stdout, "{}", serde_json::to_string(&state)?)?;
        stdout.flush()?;
    }
    Ok(())
}

fn build_ui_state(engine: &SimEngine, error: Option<String>) -> UiState {
    UiState {
        run_id: engine.run_id.clone(),
        paused: engine.clock.paused,
        held: engine.is_held(),
        ticks_per_frame: engine.clock.ticks_per_frame(),
        frame: engine.frame(),
        error,
    }
}

fn print_summary(engine: &SimEngine, ticks: u64) -> Result<()> {
    let world = engine.world();
    let progress = &world.progress;
    let outcome = match progress.outcome {
        LevelOutcome::InProgress => "in progress",
        LevelOutcome::Succeeded => "succeeded",
        LevelOutcome::Failed => "failed",
    };
    let collisions = engine.count_events("packets_collided")?;

    println!("=== RUN SUMMARY ===");
    println!("  run_id:         {}", engine.run_id);
    println!("  ticks run:      {ticks}");
    println!("  final tick:     {}", engine.clock.current_tick);
    println!("  virtual time:   {} ms", engine.clock.now);
    println!("  level:          {} ({outcome})", progress.level);
    println!("  quota:          {}/{}", progress.counted(), progress.quota);
    println!("  emitted:        {}", progress.emitted);
    println!("  delivered:      {}", progress.delivered);
    println!("  lost:           {}", progress.lost);
    println!("  timed out:      {}", progress.timed_out);
    println!("  collisions:     {collisions}");
    println!("  in flight:      {}", world.packet_count());
    println!("  coins:          {}", world.purse.coins);
    println!(
        "  wire used:      {:.1} / {:.1}",
        world.network.total_wire_length(),
        world.network.budget().ceiling()
    );

    println!();
    println!("=== EVENTS ===");
    for (event_type, count) in engine.event_counts()? {
        println!("  {event_type:<24} {count}");
    }

    if !progress.emitted_by_kind.is_empty() {
        println!();
        println!("=== EMITTED BY KIND ===");
        for (kind, count) in &progress.emitted_by_kind {
            println!("  {kind:?}: {count}");
        }
    }
    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
