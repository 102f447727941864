//! Framereel CLI - Transcode, play back and inspect compressed-frame containers.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use framereel::{
    BlockCodec, InspectSession, PlaybackSession, ToolConfig, Transcoder,
    playback::{HeadlessDisplay, HeadlessHost, spawn_stdin_keys},
    source::open_source,
};

#[derive(Parser, Debug)]
#[command(name = "framereel", version, about)]
struct Cli {
    /// Tool configuration JSON.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    print_config: bool,

    #[command(subcommand)]
    cmd: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Compress a video into a container file.
    Transcode {
        /// Video file, or `synthetic:WxH:N[@FPS]` for a test pattern.
        input: String,
        /// Quality level (0-31, 31 is lossless).
        quality: u8,
        /// Output container path.
        output: PathBuf,
    },
    /// Play a container file.
    Play {
        container: PathBuf,
        #[command(flatten)]
        host: HostArgs,
    },
    /// Compress a video live and show the codec's internal views.
    Inspect {
        /// Video file, or `synthetic:WxH:N[@FPS]` for a test pattern.
        input: String,
        /// Quality level (0-31, 31 is lossless).
        quality: u8,
        #[command(flatten)]
        host: HostArgs,
    },
}

#[derive(Args, Debug)]
struct HostArgs {
    /// Write every presented frame as a PNG into this directory.
    #[arg(long)]
    dump_dir: Option<PathBuf>,

    /// Stop at end of stream instead of waiting for quit.
    #[arg(long)]
    exit_at_end: bool,

    /// Stop after this many redraw ticks.
    #[arg(long)]
    max_ticks: Option<u64>,
}

impl HostArgs {
    fn apply(self, config: &mut ToolConfig) {
        if self.dump_dir.is_some() {
            config.host.dump_dir = self.dump_dir;
        }
        config.host.exit_at_end |= self.exit_at_end;
        if self.max_ticks.is_some() {
            config.host.max_ticks = self.max_ticks;
        }
    }
}

fn main() {
    env_logger::init();

    // Usage errors are printed, never turned into a failing exit status.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return;
        }
    };

    if let Err(e) = run(cli) {
        log::error!("{e}");
        eprintln!("Error: {e}");
    }
}

fn run(cli: Cli) -> framereel::Result<()> {
    let mut config = match &cli.config {
        Some(path) => ToolConfig::load(path)?,
        None => ToolConfig::default(),
    };

    if cli.print_config {
        match serde_json::to_string_pretty(&config) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Error serializing config: {e}"),
        }
        return Ok(());
    }

    let Some(cmd) = cli.cmd else {
        eprintln!("No command given. Run with --help for usage.");
        return Ok(());
    };

    match cmd {
        Cmd::Transcode {
            input,
            quality,
            output,
        } => {
            config.transcode.quality = quality;
            config.validate()?;
            cmd_transcode(&config, &input, output)
        }
        Cmd::Play { container, host } => {
            host.apply(&mut config);
            config.validate()?;
            cmd_play(&config, container)
        }
        Cmd::Inspect {
            input,
            quality,
            host,
        } => {
            config.inspect.quality = quality;
            host.apply(&mut config);
            config.validate()?;
            cmd_inspect(&config, &input)
        }
    }
}

fn cmd_transcode(config: &ToolConfig, input: &str, output: PathBuf) -> framereel::Result<()> {
    let mut source = open_source(input)?;
    let info = source.info().clone();
    let mut codec = match BlockCodec::new(info.width, info.height) {
        Ok(codec) => codec,
        Err(e) => {
            source.close();
            return Err(e.into());
        }
    };

    println!(
        "Transcoding {} -> {} ({}x{}, quality {})",
        input,
        output.display(),
        info.width,
        info.height,
        config.transcode.quality
    );

    let stats = Transcoder::new(config.transcode.clone()).run_to_path(
        &mut source,
        &mut codec,
        &output,
    )?;

    println!("Wrote {}: {}", output.display(), stats);
    Ok(())
}

fn cmd_play(config: &ToolConfig, container: PathBuf) -> framereel::Result<()> {
    let mut session = PlaybackSession::open(&container, &config.playback)?;
    let mut display = HeadlessDisplay::new(config.host.dump_dir.clone())?;

    let summary = HeadlessHost::new(config.host.clone())
        .with_keys(spawn_stdin_keys())
        .run(&mut session, &mut display)?;

    println!(
        "Played {} of {} frames ({} ticks)",
        session.frames_shown(),
        container.display(),
        summary.ticks
    );
    Ok(())
}

fn cmd_inspect(config: &ToolConfig, input: &str) -> framereel::Result<()> {
    let source = open_source(input)?;
    let mut session = InspectSession::open(source, &config.inspect)?;
    let mut display = HeadlessDisplay::new(config.host.dump_dir.clone())?;

    let summary = HeadlessHost::new(config.host.clone())
        .with_keys(spawn_stdin_keys())
        .run(&mut session, &mut display)?;

    println!(
        "Inspected {} frames of {} ({} ticks)",
        session.frames_encoded(),
        input,
        summary.ticks
    );
    Ok(())
}
