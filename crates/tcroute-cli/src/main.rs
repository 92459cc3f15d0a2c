//! tcroute - headless timecode router.
//!
//! Loads the settings document, builds the engine host, starts every
//! configured handler and drives the 60 Hz tick loop. The GUI front-end
//! talks to the same engine API; this binary exists for rack machines and
//! for smoke-testing a routing setup over SSH.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;

use tcroute_core::audio::{input_devices, output_devices};
use tcroute_core::net;
use tcroute_core::types::InputSource;
use tcroute_engine::{settings, Host};

const TICK_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Parser, Debug)]
#[command(name = "tcroute", version, about = "Multi-engine timecode router")]
struct Cli {
    /// Settings file (defaults to the per-user config location)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// List audio and MIDI devices, then exit
    #[arg(long)]
    list_devices: bool,

    /// List IPv4 network interfaces, then exit
    #[arg(long)]
    list_interfaces: bool,

    /// Run a fixed number of ticks and exit (0 = run until killed)
    #[arg(long, default_value_t = 0, value_name = "N")]
    ticks: u64,

    /// Print engine status lines once per second
    #[arg(short, long)]
    status: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Cli::parse();

    if args.list_devices {
        list_devices();
        return Ok(());
    }
    if args.list_interfaces {
        list_interfaces();
        return Ok(());
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(settings::default_settings_path);
    let loaded = settings::load(&config_path);
    log::info!(
        "loaded {} engine configuration(s) from {:?}",
        loaded.engines.len(),
        config_path
    );

    let mut host = Host::new();
    configure(&mut host, &loaded);

    log::info!("running {} engine(s); Ctrl-C to stop", host.engine_count());
    run_loop(&mut host, args.ticks, args.status);
    Ok(())
}

fn list_devices() {
    match input_devices() {
        Ok(devices) => {
            println!("Audio inputs:");
            for d in devices {
                println!(
                    "  [{}] {}{}",
                    d.host,
                    d.name,
                    if d.is_default { " (default)" } else { "" }
                );
            }
        }
        Err(e) => println!("Audio inputs: {e}"),
    }
    match output_devices() {
        Ok(devices) => {
            println!("Audio outputs:");
            for d in devices {
                println!(
                    "  [{}] {}{}",
                    d.host,
                    d.name,
                    if d.is_default { " (default)" } else { "" }
                );
            }
        }
        Err(e) => println!("Audio outputs: {e}"),
    }
    match tcroute_midi::list_input_ports() {
        Ok(ports) => {
            println!("MIDI inputs:");
            for p in ports {
                println!("  {p}");
            }
        }
        Err(e) => println!("MIDI inputs: {e}"),
    }
    match tcroute_midi::list_output_ports() {
        Ok(ports) => {
            println!("MIDI outputs:");
            for p in ports {
                println!("  {p}");
            }
        }
        Err(e) => println!("MIDI outputs: {e}"),
    }
}

fn list_interfaces() {
    println!("IPv4 interfaces:");
    for iface in net::interfaces() {
        println!(
            "  {} ({} -> {}, mask {})",
            iface.name, iface.ip, iface.broadcast, iface.subnet
        );
    }
}

/// Resolve an interface name from the settings document to the live list.
fn find_interface(name: &Option<String>) -> Option<net::NetInterface> {
    let name = name.as_deref()?;
    net::interfaces().into_iter().find(|i| i.name == name)
}

/// Build engines from the settings document and start whatever devices it
/// names. Individual start failures only log; the rest of the host keeps
/// running.
fn configure(host: &mut Host, loaded: &settings::Settings) {
    while host.engine_count() < loaded.engines.len() {
        host.add_engine();
    }

    let params = tcroute_core::audio::AudioParams {
        sample_rate: loaded.preferred_sample_rate,
        buffer_size: loaded.preferred_buffer_size,
    };

    for (index, engine_settings) in loaded.engines.iter().enumerate() {
        let Some(engine) = host.engine_mut(index) else { break };
        settings::apply_to_engine(engine_settings, engine);

        // Input side first would violate nothing, but outputs are started
        // first here so a conflicted device is visible immediately.
        if engine_settings.mtc_out_enabled
            && !engine.start_mtc_output(&engine_settings.midi_output_port)
        {
            log::warn!("engine {}: MTC output not started", index + 1);
        }
        if engine_settings.artnet_out_enabled {
            let iface = find_interface(&engine_settings.artnet_output_interface);
            if !engine.start_artnet_output(iface.as_ref()) {
                log::warn!("engine {}: Art-Net output not started", index + 1);
            }
        }
        if engine_settings.ltc_out_enabled {
            if let Some(device) = &engine_settings.audio_output_device {
                if !engine.start_ltc_output(device, engine_settings.audio_output_channel, &params) {
                    log::warn!("engine {}: LTC output not started", index + 1);
                }
            }
        }

        match engine.active_input() {
            InputSource::Mtc => {
                engine.start_mtc_input(&engine_settings.midi_input_port);
            }
            InputSource::ArtNet => {
                let ip: Option<Ipv4Addr> =
                    find_interface(&engine_settings.artnet_input_interface).map(|i| i.ip);
                engine.start_artnet_input(ip);
            }
            InputSource::Ltc => {
                if let Some(device) = &engine_settings.audio_input_device {
                    engine.start_ltc_input(
                        device,
                        engine_settings.ltc_input_channel,
                        engine_settings.thru_input_channel,
                        &params,
                    );
                }
            }
            InputSource::SystemTime => {}
        }

        // Pass-through last: it needs the LTC input running.
        if engine_settings.thru_out_enabled {
            if let Some(device) = &engine_settings.thru_output_device {
                if !engine.start_thru_output(device, engine_settings.thru_output_channel, &params) {
                    log::warn!("engine {}: audio thru not started", index + 1);
                }
            }
        }
    }

    host.select(loaded.selected_engine);
}

fn run_loop(host: &mut Host, max_ticks: u64, print_status: bool) {
    let mut ticks: u64 = 0;
    let mut last_status = Instant::now();

    loop {
        let started = Instant::now();
        host.tick_all();
        ticks += 1;

        if print_status && last_status.elapsed() >= Duration::from_secs(1) {
            last_status = Instant::now();
            for engine in host.engines() {
                let snap = engine.snapshot();
                println!(
                    "{}: {} {} @ {} fps{}",
                    snap.name,
                    snap.current_timecode,
                    snap.input_status,
                    snap.fps,
                    if snap.source_active { "" } else { " [paused]" }
                );
            }
        }

        if max_ticks > 0 && ticks >= max_ticks {
            // Dropping the host tears every engine down in the mandated
            // order: outputs, then AudioThru, then inputs.
            log::info!("finished {ticks} tick(s)");
            return;
        }
        std::thread::sleep(TICK_INTERVAL.saturating_sub(started.elapsed()));
    }
}
