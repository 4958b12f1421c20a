//! A sampled-waveform DFT pipeline exercising the event rendezvous across
//! three periodic tasks:
//!
//! - `task0` (40 ms) reads one frame of samples from the input file and
//!   waits for `task2` to finish with the previous frame.
//! - `task1` (80 ms) copies the current frame under the shared mutex,
//!   computes its discrete Fourier transform, and appends it to the
//!   output file.
//! - `task2` (40 ms) optionally forwards the raw frame over UDP, then
//!   signals `task0`.
//!
//! Priority inheritance (`WaitFlags::INVERSION_SAFE`) is enabled throughout.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::UdpSocket;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use ptask_core::{EventMask, PTaskResult, Runtime, Status, TaskAttr, WaitFlags};
use ptask_host_std::StdHost;

const MAX_USER_PRIO: u16 = 101;
/// Five significant digits, not `std::f64::consts::PI` — the transform's
/// bins are only reproducible run-to-run if this constant is pinned exactly.
const PI: f64 = 3.14159;
/// Values at or past this magnitude are reported as `NaN` rather than a
/// formatted float. The comparison is against the raw (possibly negative)
/// value, not its magnitude.
const MAX_ABSOLUTE_VALUE: f64 = 1000.0;

#[derive(Parser)]
#[command(about = "Sampled-waveform DFT pipeline")]
struct Args {
    /// Input file of newline-separated sample values.
    #[arg(long, default_value = "wave.txt")]
    input: PathBuf,

    /// Output file for the formatted spectrum.
    #[arg(long, default_value = "spectrum.txt")]
    output: PathBuf,

    /// Frame length for the transform. Any length works since this is a
    /// direct-summation transform, not a radix-2 FFT.
    #[arg(long, default_value_t = 256)]
    frame_length: usize,

    /// If the input file does not exist, synthesize this many frames of a
    /// test sine wave so the demo runs without external setup.
    #[arg(long, default_value_t = 8)]
    generate_frames: usize,

    /// Optional `host:port` to additionally forward each frame's raw
    /// samples to over UDP.
    #[arg(long)]
    udp_target: Option<String>,

    /// Tick rate of the host clock, in ticks per second.
    #[arg(long, default_value_t = 1000)]
    rate_hz: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Complex {
    real: f64,
    imag: f64,
}

/// Shared frame buffers passed between the three pipeline tasks under their
/// own mutexes, rather than as arguments threaded through the rendezvous.
struct SharedFrames {
    time: Mutex<Vec<f64>>,
    time_copy: Mutex<Vec<f64>>,
    freq: Mutex<Vec<Complex>>,
    input_available: AtomicBool,
}

impl SharedFrames {
    fn new(frame_length: usize) -> Self {
        Self {
            time: Mutex::new(vec![0.0; frame_length]),
            time_copy: Mutex::new(vec![0.0; frame_length]),
            freq: Mutex::new(vec![Complex::default(); frame_length]),
            input_available: AtomicBool::new(true),
        }
    }
}

/// The discrete Fourier transform via direct summation, not a radix-2 FFT,
/// so `n` need not be a power of two.
fn sft(frame_t: &[f64], frame_f: &mut [Complex]) {
    let n = frame_t.len();
    for p in 0..n {
        let mut sum = Complex::default();
        for (q, &sample) in frame_t.iter().enumerate() {
            let angle = (2.0 * PI * p as f64 * q as f64) / n as f64;
            sum.real += sample * angle.cos();
            sum.imag -= sample * angle.sin();
        }
        frame_f[p] = sum;
    }
}

/// Read `frame_t.len()` newline-separated sample values, `EofReached` if
/// the file runs out first.
fn acquire_from_file(reader: &mut BufReader<File>, frame_t: &mut [f64]) -> PTaskResult<()> {
    let mut line = String::new();
    for slot in frame_t.iter_mut() {
        line.clear();
        let bytes_read = reader.read_line(&mut line).map_err(|_| Status::HostError)?;
        if bytes_read == 0 {
            return Err(Status::EofReached);
        }
        *slot = line.trim().parse().unwrap_or(0.0);
    }
    Ok(())
}

/// The `NaN` branch triggers when either component is *not less than* the
/// threshold — a raw comparison on the signed value, not a magnitude check.
fn send_to_file(writer: &mut BufWriter<File>, frame_f: &[Complex]) -> std::io::Result<()> {
    for c in frame_f {
        if c.real < MAX_ABSOLUTE_VALUE && c.imag < MAX_ABSOLUTE_VALUE {
            writeln!(writer, "{:+.4} + j({:+.4})", c.real, c.imag)?;
        } else {
            writeln!(writer, "NaN")?;
        }
    }
    writer.flush()
}

/// One UDP datagram per sample.
fn send_to_udp(socket: &UdpSocket, target: &str, frame_t: &[f64]) -> std::io::Result<()> {
    for v in frame_t {
        let line = format!("{v:+.4}\n");
        socket.send_to(line.as_bytes(), target)?;
    }
    Ok(())
}

/// Block the calling task until a task named `name` is registered. A task's
/// body starts running as soon as its own registration completes, so it may
/// race ahead of a sibling task's creation.
fn wait_for_named_task(rt: &Arc<Runtime<StdHost>>, name: &str) -> ptask_core::TaskHandle {
    loop {
        if let Ok(handle) = rt.task_get(name) {
            return handle;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn generate_wave_file(path: &PathBuf, frame_length: usize, frames: usize) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let total = frame_length * frames;
    for i in 0..total {
        let sample = 10.0 * (2.0 * PI * i as f64 / frame_length as f64).sin();
        writeln!(writer, "{sample:+.4}")?;
    }
    writer.flush()
}

fn main() {
    env_logger::init();
    if let Err(err) = main_inner() {
        log::error!("{err:?}");
        std::process::exit(1);
    }
}

fn main_inner() -> anyhow::Result<()> {
    let args = Args::parse();

    if !args.input.exists() {
        log::info!("{:?} does not exist; synthesizing {} test frames", args.input, args.generate_frames);
        generate_wave_file(&args.input, args.frame_length, args.generate_frames)
            .with_context(|| format!("writing synthesized input to {:?}", args.input))?;
    }

    let rt = Runtime::new(StdHost::new(args.rate_hz));
    let shared = Arc::new(SharedFrames::new(args.frame_length));

    let input_path = args.input.clone();
    let output_path = args.output.clone();
    let udp_target = args.udp_target.clone();
    let frame_length = args.frame_length;

    let attr0 = TaskAttr::new("task0", 1024 * 1024, MAX_USER_PRIO, 40, 40)?;
    let attr1 = TaskAttr::new("task1", 1024 * 1024, MAX_USER_PRIO + 1, 80, 80)?;
    let attr2 = TaskAttr::new("task2", 1024 * 1024, MAX_USER_PRIO + 2, 40, 40)?;

    {
        let shared = Arc::clone(&shared);
        rt.task_create("task0", attr0, (), move |rt, ()| {
            let Ok(mut reader) = File::open(&input_path).map(BufReader::new) else {
                log::error!("task0: failed to open {input_path:?}");
                let _ = rt.task_exit();
                return;
            };
            if rt.wait_for_activation().is_err() {
                return;
            }
            let task2 = wait_for_named_task(rt, "task2");
            loop {
                let mut frame = vec![0.0; frame_length];
                match acquire_from_file(&mut reader, &mut frame) {
                    Ok(()) => {
                        *shared.time.lock().unwrap() = frame;
                    }
                    Err(_) => {
                        log::info!("task0: input exhausted");
                        shared.input_available.store(false, Ordering::SeqCst);
                        let _ = rt.task_exit();
                        return;
                    }
                }
                if rt.task_wait(task2, EventMask::GENERIC, WaitFlags::INVERSION_SAFE).is_err() {
                    return;
                }
                if rt.deadline_miss().unwrap_or(false) {
                    log::warn!("task0 missed a deadline");
                }
                if rt.wait_for_period().is_err() {
                    return;
                }
            }
        })?;
    }

    {
        let shared = Arc::clone(&shared);
        rt.task_create("task1", attr1, (), move |rt, ()| {
            let Ok(file) = File::create(&output_path) else {
                log::error!("task1: failed to create {output_path:?}");
                let _ = rt.task_exit();
                return;
            };
            let mut writer = BufWriter::new(file);
            if rt.wait_for_activation().is_err() {
                return;
            }
            loop {
                if !shared.input_available.load(Ordering::SeqCst) {
                    let _ = rt.task_exit();
                    return;
                }
                {
                    let time = shared.time.lock().unwrap();
                    shared.time_copy.lock().unwrap().copy_from_slice(&time);
                }
                {
                    let time_copy = shared.time_copy.lock().unwrap();
                    let mut freq = shared.freq.lock().unwrap();
                    sft(&time_copy, &mut freq);
                    if let Err(err) = send_to_file(&mut writer, &freq) {
                        log::error!("task1: write failed: {err}");
                    }
                }
                if rt.deadline_miss().unwrap_or(false) {
                    log::warn!("task1 missed a deadline");
                }
                if rt.wait_for_period().is_err() {
                    return;
                }
            }
        })?;
    }

    {
        let shared = Arc::clone(&shared);
        rt.task_create("task2", attr2, (), move |rt, ()| {
            let socket = udp_target.as_ref().map(|_| {
                UdpSocket::bind("0.0.0.0:0").expect("UDP socket bind")
            });
            if rt.wait_for_activation().is_err() {
                return;
            }
            loop {
                if !shared.input_available.load(Ordering::SeqCst) {
                    let _ = rt.task_exit();
                    return;
                }
                if let (Some(socket), Some(target)) = (&socket, &udp_target) {
                    let frame = shared.time.lock().unwrap().clone();
                    if let Err(err) = send_to_udp(socket, target, &frame) {
                        log::error!("task2: UDP send failed: {err}");
                    }
                }
                if rt.task_signal(EventMask::GENERIC, WaitFlags::INVERSION_SAFE).is_err() {
                    return;
                }
                if rt.deadline_miss().unwrap_or(false) {
                    log::warn!("task2 missed a deadline");
                }
                if rt.wait_for_period().is_err() {
                    return;
                }
            }
        })?;
    }

    // Poll for every task's cancellation rather than joining: the main
    // thread is not itself a registered periodic task, so it cannot call
    // into the rendezvous (`task_join` requires a registered caller).
    loop {
        let all_gone = ["task0", "task1", "task2"].iter().all(|name| rt.task_get(name).is_err());
        if all_gone {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    log::info!("pipeline finished");
    Ok(())
}
