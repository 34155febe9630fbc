//! Oxidized-Xenos - command stream replay
//!
//! Loads a captured PM4 command stream into guest memory and runs it through
//! the command processor as one indirect buffer.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use xe_core::config::Config;
use xe_gpu::{CommandProcessor, DrainStatus, NullBackend, RecordingTraceWriter, TraceEvent};
use xe_memory::MemoryManager;

/// Guest address the stream is loaded at unless one is given
const DEFAULT_LOAD_ADDRESS: u32 = 0x0010_0000;

fn main() -> Result<()> {
    let config = match Config::load() {
        Ok(config) => {
            xe_core::logging::init(&config);
            config
        }
        Err(e) => {
            xe_core::logging::init_default();
            tracing::warn!("Ignoring unreadable configuration: {}", e);
            Config::default()
        }
    };

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <command-stream.bin> [load-address]", args[0]);
        eprintln!("       {} --write-config", args[0]);
        eprintln!("\nThe stream is a sequence of big-endian PM4 words.");
        std::process::exit(1);
    }

    if args[1] == "--write-config" {
        config.save().context("Failed to save configuration")?;
        if let Some(path) = Config::config_path() {
            println!("Configuration written to {}", path.display());
        }
        return Ok(());
    }

    let path = PathBuf::from(&args[1]);
    let load_address = match args.get(2) {
        Some(arg) => parse_address(arg)?,
        None => DEFAULT_LOAD_ADDRESS,
    };

    let stream = fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    if stream.len() % 4 != 0 {
        bail!("{} is {} bytes, not a whole number of words", path.display(), stream.len());
    }
    let word_count = (stream.len() / 4) as u32;

    let memory = MemoryManager::new(config.memory.physical_size)
        .context("Failed to initialize guest memory")?;
    memory
        .write_bytes(load_address, &stream)
        .with_context(|| format!("Stream does not fit at 0x{:08X}", load_address))?;

    tracing::info!(
        "Replaying {} words from {} at 0x{:08X}",
        word_count,
        path.display(),
        load_address
    );

    let trace = RecordingTraceWriter::new();
    let mut processor = CommandProcessor::new(
        Arc::clone(&memory),
        Box::new(NullBackend::new()),
        config.gpu.clone(),
    )
    .with_trace_writer(Box::new(trace.clone()));

    let status = processor
        .execute_indirect_buffer(load_address, word_count)
        .context("Replay failed")?;

    let stats = processor.stats();
    let events = trace.events();
    let bytes_read: u64 = events
        .iter()
        .filter_map(|e| match e {
            TraceEvent::MemoryRead { size, .. } => Some(*size as u64),
            _ => None,
        })
        .sum();
    let bytes_written: u64 = events
        .iter()
        .filter_map(|e| match e {
            TraceEvent::MemoryWrite { size, .. } => Some(*size as u64),
            _ => None,
        })
        .sum();

    println!("=== Replay Summary ===");
    println!("Status:            {:?}", status);
    println!("Packets:           {}", stats.packets);
    println!("  skipped:         {}", stats.skipped);
    println!("  ignored:         {}", stats.ignored);
    println!("  failed:          {}", stats.failed);
    println!("Indirect buffers:  {}", stats.indirect_buffers);
    println!("Frames:            {}", processor.frame_counter());
    println!("Memory read:       {} bytes", bytes_read);
    println!("Memory written:    {} bytes", bytes_written);

    if status == DrainStatus::Overflow {
        println!("\n⚠ Stream ends inside a packet");
    }
    Ok(())
}

fn parse_address(arg: &str) -> Result<u32> {
    let parsed = match arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => arg.parse(),
    };
    parsed.with_context(|| format!("Invalid load address '{}'", arg))
}
