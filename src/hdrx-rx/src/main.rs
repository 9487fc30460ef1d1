// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod audio;
mod config;
mod events;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use hdrx_app::{init_logging, normalize_name, split_host_port, ConfigFile};
use hdrx_backend::rtltcp::DEFAULT_PORT as RTLTCP_DEFAULT_PORT;
use hdrx_backend::{register_builtin_backends_on, RegistrationContext, TunerAccess};
use hdrx_core::pipeline::IqPassthrough;
use hdrx_core::{
    AudioFiller, AudioPool, AudioSink, DirectSampling, DynResult, Freq, Mode, Receiver,
    SampleFormat,
};

use audio::SinkFactory;
use config::{RxConfig, MAX_PROGRAM};
use events::EventHandler;

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - HD Radio receiver front end");

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Center frequency (MHz below 10000, otherwise Hz)
    #[arg(value_name = "FREQ")]
    frequency: Option<f64>,
    /// Audio program to output (0-7)
    #[arg(value_name = "PROGRAM")]
    program: Option<u32>,
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// List the tuner backends compiled in and exit
    #[arg(long = "list-backends")]
    list_backends: bool,
    /// Replay recorded samples from a file ("-" for stdin)
    #[arg(short = 'r', long = "input", value_name = "FILE")]
    input: Option<PathBuf>,
    /// Sample format of the input file (cu8, cs16)
    #[arg(long = "format", value_name = "FORMAT")]
    format: Option<SampleFormat>,
    /// USB dongle device index
    #[arg(short = 'd', long = "device", value_name = "INDEX")]
    device_index: Option<u32>,
    /// rtl_tcp relay address (host[:port])
    #[arg(short = 'H', long = "rtltcp", value_name = "HOST[:PORT]")]
    rtltcp: Option<String>,
    /// SoapySDR device arguments (e.g. driver=airspy)
    #[arg(long = "soapy", value_name = "ARGS")]
    soapy: Option<String>,
    /// SoapySDR per-element gains (e.g. LNA=10,VGA=20 or AGC=1)
    #[arg(long = "gains", value_name = "SETTINGS")]
    gains: Option<String>,
    /// Use a HackRF
    #[arg(long = "hackrf", group = "vendor")]
    hackrf: bool,
    /// Use an SDRplay RSP
    #[arg(long = "sdrplay", group = "vendor")]
    sdrplay: bool,
    /// Vendor device serial number (or index for an RSP)
    #[arg(long = "serial", requires = "vendor")]
    serial: Option<String>,
    /// Fixed gain in dB (automatic when omitted)
    #[arg(short = 'g', long = "gain", value_name = "DB", allow_negative_numbers = true)]
    gain: Option<f32>,
    /// Frequency correction in ppm
    #[arg(short = 'p', long = "ppm", allow_negative_numbers = true)]
    ppm: Option<i32>,
    /// Enable the bias tee
    #[arg(short = 'T', long = "bias-tee")]
    bias_tee: bool,
    /// Antenna port name
    #[arg(short = 'A', long = "antenna")]
    antenna: Option<String>,
    /// RTL2832 direct sampling (0 off, 1 I branch, 2 Q branch)
    #[arg(long = "direct-sampling", value_name = "MODE")]
    direct_sampling: Option<u32>,
    /// Receive AM instead of FM
    #[arg(long = "am")]
    am: bool,
    /// Print events as JSON lines on stdout
    #[arg(long = "json")]
    json: bool,
    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long = "log-level")]
    log_level: Option<String>,
    /// Write the program's audio to a WAV file
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,
    /// Play the program's audio on an output device
    #[arg(long = "playback")]
    playback: bool,
    /// Output device for playback
    #[arg(long = "audio-device", requires = "playback")]
    audio_device: Option<String>,
}

/// Resolved configuration after merging config file and CLI arguments.
#[derive(Debug, Clone)]
struct ResolvedConfig {
    backend: String,
    access: TunerAccess,
    frequency: Option<Freq>,
    program: u32,
    gain_db: Option<f32>,
    ppm: i32,
    bias_tee: bool,
    antenna: Option<String>,
    direct_sampling: DirectSampling,
    mode: Mode,
    json: bool,
    wav: Option<PathBuf>,
    playback: bool,
    audio_device: Option<String>,
}

/// Backend and access selected on the command line, if any.
fn cli_access(cli: &Cli) -> DynResult<Option<(&'static str, TunerAccess)>> {
    if let Some(path) = &cli.input {
        let format = cli.format.unwrap_or_default();
        return Ok(Some((
            "file",
            TunerAccess::File {
                path: path.clone(),
                format,
            },
        )));
    }
    if let Some(addr) = &cli.rtltcp {
        let (host, port) = split_host_port(addr, RTLTCP_DEFAULT_PORT)?;
        let addr = if host.contains(':') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };
        return Ok(Some(("rtltcp", TunerAccess::Tcp { addr })));
    }
    if let Some(args) = &cli.soapy {
        return Ok(Some((
            "soapysdr",
            TunerAccess::Sdr {
                args: args.clone(),
                gains: cli.gains.clone(),
            },
        )));
    }
    if cli.hackrf || cli.sdrplay {
        let backend = if cli.hackrf { "hackrf" } else { "sdrplay" };
        return Ok(Some((
            backend,
            TunerAccess::Vendor {
                serial: cli.serial.clone(),
            },
        )));
    }
    if let Some(index) = cli.device_index {
        return Ok(Some(("rtlsdr", TunerAccess::Usb { index })));
    }
    Ok(None)
}

/// Access for a backend named in the config without an explicit access table.
fn default_access(backend: &str) -> DynResult<TunerAccess> {
    match backend {
        "rtlsdr" => Ok(TunerAccess::Usb { index: 0 }),
        "hackrf" | "sdrplay" => Ok(TunerAccess::Vendor { serial: None }),
        "soapysdr" => Ok(TunerAccess::Sdr {
            args: String::new(),
            gains: None,
        }),
        other => Err(format!(
            "Backend {other} needs an access method. Set [tuner.access] in config."
        )
        .into()),
    }
}

fn resolve_config(
    cli: &Cli,
    cfg: &RxConfig,
    registry: &RegistrationContext,
) -> DynResult<ResolvedConfig> {
    let (backend, access) = match cli_access(cli)? {
        Some((name, access)) => (name.to_string(), access),
        None => {
            let backend = normalize_name(cfg.tuner.backend.as_deref().unwrap_or("rtlsdr"));
            let access = match cfg.tuner.access.clone() {
                Some(access) => access,
                None => default_access(&backend)?,
            };
            (backend, access)
        }
    };
    if !registry.is_backend_registered(&backend) {
        return Err(format!(
            "Backend {} is not available in this build (available: {})",
            backend,
            registry.registered_backends().join(", ")
        )
        .into());
    }

    let frequency = match cli.frequency.or(cfg.tuner.frequency) {
        Some(value) => Some(
            Freq::from_user(value).ok_or_else(|| format!("Invalid frequency: {value}"))?,
        ),
        None => None,
    };
    if frequency.is_none() && !matches!(access, TunerAccess::File { .. }) {
        return Err("Frequency not specified. Pass FREQ or set [tuner].frequency in config.".into());
    }

    let program = cli.program.unwrap_or(cfg.tuner.program);
    if program > MAX_PROGRAM {
        return Err(format!("Program {program} out of range (0-{MAX_PROGRAM})").into());
    }

    let direct_sampling = match cli.direct_sampling {
        Some(raw) => DirectSampling::try_from(raw)?,
        None => cfg.tuner.direct_sampling,
    };

    Ok(ResolvedConfig {
        backend,
        access,
        frequency,
        program,
        gain_db: cli.gain.or(cfg.tuner.gain_db),
        ppm: cli.ppm.unwrap_or(cfg.tuner.ppm),
        bias_tee: cli.bias_tee || cfg.tuner.bias_tee,
        antenna: cli.antenna.clone().or_else(|| cfg.tuner.antenna.clone()),
        direct_sampling,
        mode: if cli.am { Mode::Am } else { cfg.tuner.mode },
        json: cli.json || cfg.output.json,
        wav: cli.output.clone().or_else(|| cfg.output.wav.clone()),
        playback: cli.playback || cfg.output.playback,
        audio_device: cli
            .audio_device
            .clone()
            .or_else(|| cfg.output.device.clone()),
    })
}

/// Build the audio sink factory for the configured outputs, if any.
fn audio_outputs(resolved: &ResolvedConfig) -> DynResult<Option<SinkFactory>> {
    #[cfg(not(feature = "playback"))]
    if resolved.playback || resolved.audio_device.is_some() {
        return Err("Playback support is not compiled in (enable feature 'playback')".into());
    }
    if resolved.wav.is_none() && !resolved.playback {
        return Ok(None);
    }

    let wav = resolved.wav.clone();
    #[cfg(feature = "playback")]
    let playback = resolved.playback.then(|| resolved.audio_device.clone());

    Ok(Some(Box::new(move || -> std::io::Result<Box<dyn AudioSink>> {
        let mut sinks: Vec<Box<dyn AudioSink>> = Vec::new();
        if let Some(path) = wav {
            sinks.push(Box::new(audio::WavSink::create(&path)?));
        }
        #[cfg(feature = "playback")]
        if let Some(device) = playback {
            sinks.push(Box::new(audio::PlaybackSink::open(device.as_deref())?));
        }
        Ok(Box::new(audio::FanOut(sinks)))
    })))
}

/// Apply the resolved tuner settings to a stopped receiver.
fn configure(receiver: &Receiver, resolved: &ResolvedConfig) -> DynResult<()> {
    receiver.set_mode(resolved.mode)?;
    if resolved.direct_sampling != DirectSampling::Off {
        receiver.set_direct_sampling(resolved.direct_sampling)?;
    }
    if resolved.ppm != 0 {
        receiver.set_freq_correction(resolved.ppm)?;
    }
    if resolved.bias_tee {
        receiver.set_bias_tee(true)?;
    }
    if let Some(antenna) = resolved.antenna.as_deref() {
        receiver.set_antenna(antenna)?;
    }
    if let Some(freq) = resolved.frequency {
        receiver.set_frequency(freq)?;
    }
    match resolved.gain_db {
        Some(gain) => {
            receiver.set_auto_gain(false);
            receiver.set_gain(gain)?;
        }
        None => receiver.set_auto_gain(true),
    }
    Ok(())
}

fn open_receiver(
    registry: &RegistrationContext,
    resolved: &ResolvedConfig,
    handler: Arc<EventHandler>,
) -> DynResult<Receiver> {
    let backend = registry.build_tuner(&resolved.backend, resolved.access.clone())?;
    let mut receiver = Receiver::open(backend, |reporter| Box::new(IqPassthrough::new(reporter)))?;
    receiver.set_callback(move |event| handler.handle(event));

    let started = configure(&receiver, resolved).and_then(|()| Ok(receiver.start()?));
    if let Err(e) = started {
        if let Err(close_err) = receiver.close() {
            warn!("Closing receiver after failed start: {}", close_err);
        }
        return Err(e);
    }
    Ok(receiver)
}

fn shutdown_receiver(mut receiver: Receiver) {
    if let Err(e) = receiver.stop() {
        warn!("Stopping receiver: {}", e);
    }
    if let Err(e) = receiver.close() {
        warn!("Closing receiver: {}", e);
    }
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", RxConfig::example_combined_toml());
        return Ok(());
    }

    let (cfg, config_path) = RxConfig::load(cli.config.as_deref())?;
    init_logging(
        cli.log_level
            .as_deref()
            .or(cfg.general.log_level.as_deref()),
    );
    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let mut registry = RegistrationContext::new();
    register_builtin_backends_on(&mut registry);

    if cli.list_backends {
        for name in registry.registered_backends() {
            println!("{name}");
        }
        return Ok(());
    }

    let resolved = resolve_config(&cli, &cfg, &registry)?;
    info!("{} starting with backend {}", hdrx_core::version(), resolved.backend);

    let pool = Arc::new(AudioPool::default());
    let consumer = match audio_outputs(&resolved)? {
        Some(make_sink) => Some(audio::spawn_consumer(pool.clone(), make_sink)?),
        None => None,
    };
    let filler = consumer.as_ref().map(|_| AudioFiller::new(pool.clone()));

    let (lost_tx, mut lost_rx) = watch::channel(false);
    let mut handler = EventHandler::new(resolved.program, filler, lost_tx);
    if resolved.json {
        handler = handler.with_json(Box::new(std::io::stdout()));
    }
    let handler = Arc::new(handler);

    let receiver = {
        let resolved = resolved.clone();
        let handler = handler.clone();
        tokio::task::spawn_blocking(move || open_receiver(&registry, &resolved, handler))
            .await??
    };
    match resolved.frequency {
        Some(freq) => info!("Receiving program {} at {}", resolved.program, freq),
        None => info!("Receiving program {}", resolved.program),
    }

    tokio::select! {
        res = signal::ctrl_c() => {
            res?;
            info!("Ctrl+C received, shutting down");
        }
        _ = lost_rx.wait_for(|lost| *lost) => {
            warn!("Tuner stopped delivering samples, shutting down");
        }
    }

    tokio::task::spawn_blocking(move || shutdown_receiver(receiver)).await?;

    handler.flush_audio();
    pool.finish();
    if let Some(consumer) = consumer {
        if tokio::task::spawn_blocking(move || consumer.join())
            .await?
            .is_err()
        {
            warn!("Audio thread panicked");
        }
    }
    let dropped = handler.dropped_audio_samples();
    if dropped > 0 {
        warn!("Dropped {} audio samples (output too slow)", dropped);
    }
    Ok(())
}
