//! CLI entry point for the VERA co-simulation driver.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::PathBuf;

#[cfg(test)]
use tempfile as _;
use vsim_core::regs::{ADDR_H, ADDR_L, ADDR_M, CTRL, DATA0};
use vsim_core::{
    load_analyzer_csv, load_video_log, AnalyzerOptions, Board, BusCommand, IngestError, Program,
    ReferenceChip, ReplayTable, RunSummary, SimConfig, Simulation, DEFAULT_MAX_FRAMES,
};

mod logging;
mod output;
#[cfg(feature = "window")]
mod window;

use logging::SimLogger;
use output::{OutputError, RunOutputs};

const USAGE_TEXT: &str = "\
Usage: vera-vsim [options]

Options:
  -n                 Do not render frames (no screenshots)
  -f                 Fast mode: skip replay gaps until audio starts
  -w                 Wait for RETURN before exiting
  -t                 Write a waveform trace (vera_vsim.vcd)
  -c <file>          Replay a logic-analyzer CSV capture
  -l <file>          Replay an emulator video-register log
  --frames <n>       Stop after n frames, 0 runs until interrupted (default 3)
  --logdir <dir>     Output directory (default: logs)
  --board <name>     Bus pinout: strobed or rnw (default: strobed)
  -h, --help         Show this help message

Examples:
  vera-vsim
  vera-vsim -n --frames 10
  vera-vsim -f -c capture.csv
";

const DEFAULT_LOG_DIR: &str = "logs";

/// Where register writes are replayed from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplaySource {
    Analyzer(PathBuf),
    VideoLog(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
struct RunArgs {
    render: bool,
    fast: bool,
    wait: bool,
    trace: bool,
    replay: Option<ReplaySource>,
    max_frames: Option<u32>,
    logdir: PathBuf,
    board: Board,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            render: true,
            fast: false,
            wait: false,
            trace: false,
            replay: None,
            max_frames: Some(DEFAULT_MAX_FRAMES),
            logdir: PathBuf::from(DEFAULT_LOG_DIR),
            board: Board::Strobed,
        }
    }
}

#[derive(Debug)]
enum ParseResult {
    Run(RunArgs),
    Help,
}

fn value_for(flag: &str, args: &mut impl Iterator<Item = OsString>) -> Result<OsString, String> {
    args.next()
        .ok_or_else(|| format!("missing value for {flag}"))
}

#[allow(clippy::while_let_on_iterator)]
fn parse_args(mut args: impl Iterator<Item = OsString>) -> Result<ParseResult, String> {
    let mut run = RunArgs::default();

    while let Some(arg) = args.next() {
        let flag = arg.to_string_lossy().to_string();
        match flag.as_str() {
            "-h" | "--help" => return Ok(ParseResult::Help),
            "-n" => run.render = false,
            "-f" => run.fast = true,
            "-w" => run.wait = true,
            "-t" => run.trace = true,
            "-c" | "-l" => {
                if run.replay.is_some() {
                    return Err("only one replay file can be given".to_string());
                }
                let path = PathBuf::from(value_for(&flag, &mut args)?);
                run.replay = Some(if flag == "-c" {
                    ReplaySource::Analyzer(path)
                } else {
                    ReplaySource::VideoLog(path)
                });
            }
            "--frames" => {
                let value = value_for(&flag, &mut args)?;
                let frames: u32 = value
                    .to_string_lossy()
                    .parse()
                    .map_err(|_| format!("invalid frame count: {}", value.to_string_lossy()))?;
                run.max_frames = (frames != 0).then_some(frames);
            }
            "--logdir" => run.logdir = PathBuf::from(value_for(&flag, &mut args)?),
            "--board" => {
                let value = value_for(&flag, &mut args)?;
                let name = value.to_string_lossy();
                run.board =
                    Board::from_name(&name).ok_or_else(|| format!("unknown board: {name}"))?;
            }
            other => return Err(format!("unknown option: {other}")),
        }
    }

    Ok(ParseResult::Run(run))
}

/// Program used when no capture is replayed: fills the visible screen with
/// sixteen gray bands, then idles for a few frames.
fn default_program() -> Program {
    const BAND_BYTES: u32 = 640 * 30;

    let mut commands = vec![
        BusCommand::delay(50),
        BusCommand::reg_write(CTRL, 0x00),
        BusCommand::reg_write(ADDR_L, 0x00),
        BusCommand::reg_write(ADDR_M, 0x00),
        BusCommand::reg_write(ADDR_H, 0x10),
    ];
    commands.extend((0u8..16).map(|gray| BusCommand::reg_write_repeated(DATA0, gray, BAND_BYTES)));
    commands.extend(std::iter::repeat_n(BusCommand::wait_vsync(), 8));
    commands.push(BusCommand::done());
    Program::new(commands)
}

/// Program wrapped around a replayed capture.
fn replay_program() -> Program {
    Program::new(vec![
        BusCommand::delay(50),
        BusCommand::wait_vsync(),
        BusCommand::reg_write_replay(),
        BusCommand::wait_vsync(),
        BusCommand::done(),
    ])
}

fn load_replay(source: &ReplaySource) -> Result<ReplayTable, IngestError> {
    let table = match source {
        ReplaySource::Analyzer(path) => load_analyzer_csv(path, &AnalyzerOptions::default())?,
        ReplaySource::VideoLog(path) => load_video_log(path)?,
    };
    log::info!(
        "replaying {} register writes spanning {} bus cycles",
        table.len(),
        table.span_cycles()
    );
    Ok(table)
}

fn sim_config(args: &RunArgs) -> SimConfig {
    SimConfig {
        board: args.board,
        fast_mode: args.fast,
        max_frames: args.max_frames,
        trace: args.trace,
        render: args.render,
        ..SimConfig::default()
    }
}

fn report_summary(summary: &RunSummary, outputs: &RunOutputs) {
    log::info!(
        "Simulation ended after {} frames, {} pixel clock ticks ({:.4} milliseconds)",
        summary.frames,
        summary.ticks,
        summary.elapsed_ms
    );
    log::info!(
        "bus: {} writes, {} reads, {} cursor overflows",
        summary.bus.writes,
        summary.bus.reads,
        summary.bus.cursor_overflows
    );
    if summary.frames == 0 {
        let (width, height) = summary.max_geometry;
        log::warn!("no synchronized frame; largest geometry seen {width}x{height}");
    }
    if summary.audio_samples > 0 {
        log::info!("audio: {} stereo samples", summary.audio_samples);
    }
    log::debug!("{} screenshots written", outputs.screenshots().len());
}

fn run_sim(args: &RunArgs) -> Result<(), i32> {
    if let Err(source) = fs::create_dir_all(&args.logdir) {
        let err = OutputError::Directory {
            path: args.logdir.clone(),
            source,
        };
        eprintln!("error: {err}");
        return Err(1);
    }
    if let Err(err) = SimLogger::install(&args.logdir) {
        eprintln!("error: {err}");
        return Err(1);
    }

    let config = sim_config(args);
    log::info!(
        "VERA simulation. Video {} x {}, {} frames, board {:?}",
        config.timing.visible_width,
        config.timing.visible_height,
        config
            .max_frames
            .map_or_else(|| "unlimited".to_string(), |n| n.to_string()),
        config.board
    );

    let replay = match args.replay.as_ref().map(load_replay).transpose() {
        Ok(replay) => replay,
        Err(err) => {
            log::error!("{err}");
            return Err(1);
        }
    };
    let program = if replay.is_some() {
        replay_program()
    } else {
        default_program()
    };

    let chip = ReferenceChip::new(config.timing);
    let mut sim = match Simulation::new(config.clone(), chip, program, replay) {
        Ok(sim) => sim,
        Err(err) => {
            log::error!("{err}");
            return Err(1);
        }
    };

    let stop = sim.stop_handle();
    if let Err(err) = ctrlc::set_handler(move || stop.request_stop()) {
        log::warn!("cannot install Ctrl-C handler: {err}");
    }

    let mut outputs = match RunOutputs::create(&args.logdir, &config) {
        Ok(outputs) => outputs,
        Err(err) => {
            log::error!("{err}");
            return Err(1);
        }
    };

    let summary = sim.run(&mut outputs);
    report_summary(&summary, &outputs);
    if let Err(err) = outputs.finish() {
        log::error!("{err}");
    }

    if args.wait {
        println!("Press RETURN to exit");
        let mut line = String::new();
        let _ = io::stdin().read_line(&mut line);
    }
    Ok(())
}

fn main() {
    let exit_code = match parse_args(env::args_os().skip(1)) {
        Ok(ParseResult::Help) => {
            println!("{USAGE_TEXT}");
            0
        }
        Ok(ParseResult::Run(args)) => match run_sim(&args) {
            Ok(()) => 0,
            Err(code) => code,
        },
        Err(error) => {
            eprintln!("error: {error}");
            eprintln!("{USAGE_TEXT}");
            1
        }
    };

    log::logger().flush();
    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    fn parse(args: &[&str]) -> Result<ParseResult, String> {
        parse_args(args.iter().map(OsString::from))
    }

    fn parse_run(args: &[&str]) -> RunArgs {
        match parse(args).expect("valid args") {
            ParseResult::Run(run) => run,
            ParseResult::Help => panic!("unexpected help"),
        }
    }

    #[test]
    fn no_arguments_use_defaults() {
        assert_eq!(parse_run(&[]), RunArgs::default());
    }

    #[test]
    fn parses_every_flag() {
        let run = parse_run(&[
            "-n", "-f", "-w", "-t", "-c", "cap.csv", "--frames", "0", "--logdir", "out",
            "--board", "rnw",
        ]);
        assert_eq!(
            run,
            RunArgs {
                render: false,
                fast: true,
                wait: true,
                trace: true,
                replay: Some(ReplaySource::Analyzer(PathBuf::from("cap.csv"))),
                max_frames: None,
                logdir: PathBuf::from("out"),
                board: Board::ReadNotWrite,
            }
        );
    }

    #[test]
    fn video_log_replay_flag() {
        let run = parse_run(&["-l", "video.log", "--frames", "5"]);
        assert_eq!(
            run.replay,
            Some(ReplaySource::VideoLog(PathBuf::from("video.log")))
        );
        assert_eq!(run.max_frames, Some(5));
    }

    #[test]
    fn parses_help_flag() {
        assert!(matches!(parse(&["-h"]), Ok(ParseResult::Help)));
        assert!(matches!(parse(&["-n", "--help"]), Ok(ParseResult::Help)));
    }

    #[test]
    fn rejects_bad_input() {
        let cases: [(&[&str], &str); 5] = [
            (&["-x"], "unknown option"),
            (&["--frames"], "missing value"),
            (&["--frames", "many"], "invalid frame count"),
            (&["--board", "isa"], "unknown board"),
            (&["-c", "a.csv", "-l", "b.log"], "only one replay"),
        ];
        for (args, message) in cases {
            let error = parse(args).expect_err("should be rejected");
            assert!(error.contains(message), "{args:?}: {error}");
        }
    }

    #[test]
    fn default_program_covers_the_screen() {
        let program = default_program();
        let data_writes: u32 = program
            .iter()
            .filter(|command| command.register() == Some(DATA0))
            .map(BusCommand::repeat_count)
            .sum();
        assert_eq!(data_writes, 640 * 480);
        assert!(!program.uses_replay());
        assert!(replay_program().uses_replay());
    }
}
