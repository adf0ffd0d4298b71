//! `vortex` — command-line register-program generator for Vortex CNN
//! accelerators.
//!
//! ```text
//! USAGE:
//!   vortex generate --device vtx800 --demo conv -o cnn_load.c
//!   vortex generate --device vtx700 --demo streaming --format mem -o load.mem
//!   vortex variants                  List known device variants
//! ```

use std::fs::File;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use vortex_chip::{DeviceProfile, DeviceVariant};
use vortex_codegen::network::{LayerSpec, Network, Weights};
use vortex_codegen::simulate::{FixedPointSimulator, Tensor};
use vortex_codegen::{generate_with_api, RunConfig, Severity, SinkKind};

#[derive(Parser)]
#[command(name = "vortex", about = "Vortex CNN accelerator code generator", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Generate a register program for a built-in demo network.
    Generate {
        /// Device variant (vtx700, vtx800).
        #[arg(long, default_value = "vtx700")]
        device: String,
        /// Demo network (conv, streaming, depthwise).
        #[arg(long, default_value = "conv")]
        demo: String,
        /// Artifact format: c (top-level source), mem (block-level image),
        /// none (dry run).
        #[arg(long, default_value = "c")]
        format: String,
        /// Output file.
        #[arg(short, long)]
        output: PathBuf,
        /// Split the expected-output table and check function into a
        /// separate API source file (c format only).
        #[arg(long)]
        api_output: Option<PathBuf>,
        /// Downgrade advisories to warnings.
        #[arg(long)]
        permissive: bool,
        /// Force-write zero-valued registers.
        #[arg(long)]
        zero_regs: bool,
        /// Zero the Tornado RAM of every used group before execution.
        #[arg(long)]
        init_tram: bool,
        /// Skip the expected-output verify table.
        #[arg(long)]
        no_verify: bool,
        /// Cap the number of verify-table entries.
        #[arg(long)]
        max_verify: Option<usize>,
    },
    /// List the known device variants and their geometry.
    Variants,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Cmd::Generate {
            device,
            demo,
            format,
            output,
            api_output,
            permissive,
            zero_regs,
            init_tram,
            no_verify,
            max_verify,
        } => cmd_generate(
            &device,
            &demo,
            &format,
            &output,
            api_output.as_ref(),
            permissive,
            zero_regs,
            init_tram,
            no_verify,
            max_verify,
        ),
        Cmd::Variants => cmd_variants(),
    }
}

#[allow(clippy::too_many_arguments, clippy::fn_params_excessive_bools)]
fn cmd_generate(
    device: &str,
    demo: &str,
    format: &str,
    output: &PathBuf,
    api_output: Option<&PathBuf>,
    permissive: bool,
    zero_regs: bool,
    init_tram: bool,
    no_verify: bool,
    max_verify: Option<usize>,
) -> Result<()> {
    let Some(variant) = DeviceVariant::from_name(device) else {
        bail!("unknown device variant {device:?} (expected vtx700 or vtx800)");
    };
    let profile = DeviceProfile::for_variant(variant);

    let mut config = if permissive {
        RunConfig::permissive()
    } else {
        RunConfig::default()
    };
    config.sink = match format {
        "c" => SinkKind::TopLevel,
        "mem" => SinkKind::BlockLevel,
        "none" => SinkKind::Debug,
        other => bail!("unknown artifact format {other:?} (expected c, mem or none)"),
    };
    config.write_zero_regs = zero_regs;
    config.init_tram = init_tram;
    config.verify_output = !no_verify;
    config.max_verify_count = max_verify;

    let (net, frame) = match demo {
        "conv" => demo_conv(),
        "streaming" => {
            config.fifo = true;
            demo_streaming()
        }
        "depthwise" => demo_depthwise(),
        other => bail!("unknown demo network {other:?} (expected conv, streaming or depthwise)"),
    };

    if api_output.is_some() && config.sink != SinkKind::TopLevel {
        bail!("--api-output only applies to the c artifact format");
    }
    let out = File::create(output)
        .with_context(|| format!("cannot create {}", output.display()))?;
    let api: Option<Box<dyn std::io::Write>> = match api_output {
        Some(path) => {
            let f = File::create(path)
                .with_context(|| format!("cannot create {}", path.display()))?;
            Some(Box::new(f))
        }
        None => None,
    };
    let report = generate_with_api(
        &net,
        &profile,
        &config,
        Some(&frame),
        Some(&FixedPointSimulator),
        Box::new(out),
        api,
    )
    .with_context(|| format!("generation failed for {variant}"))?;

    for d in &report.diagnostics {
        if d.severity != Severity::Notice {
            eprintln!("{d}");
        }
    }
    info!(layers = report.layers, "generated {}", output.display());
    println!(
        "{}: {} layer(s), {} write(s), {} read(s), {} verify word(s), est. {:.3} ms",
        variant,
        report.layers,
        report.writes,
        report.reads,
        report.verify_words,
        report.access_time_ms
    );
    Ok(())
}

fn cmd_variants() -> Result<()> {
    for variant in [DeviceVariant::Vtx700, DeviceVariant::Vtx800] {
        let p = DeviceProfile::for_variant(variant);
        println!("{variant}");
        println!(
            "  {} group(s) x {} lane(s), {} layer slot(s), {} streaming slot(s)",
            p.groups, p.lanes_per_group, p.max_layers, p.max_stream_layers
        );
        println!(
            "  mask {} row(s)/lane, bias {} byte(s)/group, data {} byte(s)/bank",
            p.mask_width_large,
            p.bias_size,
            p.data_mem_bytes()
        );
        println!();
    }
    Ok(())
}

/// Ramp weights so demo artifacts carry a recognizable pattern.
fn ramp_weights(out_ch: usize, in_ch: usize, taps: usize) -> Option<Weights> {
    #[allow(clippy::cast_possible_truncation)]
    let data: Vec<i8> = (0..out_ch * in_ch * taps)
        .map(|i| ((i % 15) as i8) - 7)
        .collect();
    let (rows, cols) = if taps == 9 { (3, 3) } else { (taps, 1) };
    Weights::new(data, out_ch, in_ch, rows, cols)
}

/// Sample frame with a repeating ramp pattern.
fn ramp_frame(channels: usize, rows: usize, cols: usize) -> Tensor {
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let data: Vec<i32> = (0..channels * rows * cols)
        .map(|i| (i as i32 % 256) - 128)
        .collect();
    Tensor::new(channels, rows, cols, data).unwrap_or_else(|| Tensor::zeros(channels, rows, cols))
}

/// Three-layer 2-D CNN: conv, max-pool conv, conv head.
fn demo_conv() -> (Network, Tensor) {
    let mut l0 = LayerSpec::conv2d(3, 16, [32, 32]);
    l0.processor_map = 0x7;
    l0.output_processor_map = 0xffff;
    l0.padding = [1, 1];
    l0.out_offset = 0x2000;
    l0.next_sequence = Some(1);
    l0.weights = ramp_weights(16, 3, 9);
    l0.bias = Some((0i8..16).map(|i| i - 8).collect());
    l0.activation = vortex_codegen::network::Activation::Relu;

    let mut l1 = LayerSpec::conv2d(16, 16, [32, 32]);
    l1.processor_map = 0xffff;
    l1.output_processor_map = 0xffff << 16;
    l1.padding = [1, 1];
    l1.pool = [2, 2];
    l1.pool_stride = [2, 2];
    l1.pool_max = true;
    l1.in_offset = 0x2000;
    l1.next_sequence = Some(2);
    l1.weights = ramp_weights(16, 16, 9);
    l1.activation = vortex_codegen::network::Activation::Relu;

    let mut l2 = LayerSpec::conv2d(16, 10, [16, 16]);
    l2.padding = [1, 1];
    l2.processor_map = 0xffff << 16;
    l2.output_processor_map = 0x3ff;
    l2.out_offset = 0x2000;
    l2.weights = ramp_weights(10, 16, 9);

    (Network::new(vec![l0, l1, l2]), ramp_frame(3, 32, 32))
}

/// Single streamed layer fed through the FIFO front end.
fn demo_streaming() -> (Network, Tensor) {
    let mut l = LayerSpec::conv2d(3, 8, [64, 64]);
    l.processor_map = 0x7;
    l.output_processor_map = 0xff;
    l.padding = [1, 1];
    l.streaming = true;
    l.out_offset = 0x4000;
    l.weights = ramp_weights(8, 3, 9);

    (Network::new(vec![l]), ramp_frame(3, 64, 64))
}

/// Depthwise layer: one kernel per lane, per-channel bias.
fn demo_depthwise() -> (Network, Tensor) {
    let mut l = LayerSpec::conv2d(8, 8, [16, 16]);
    l.conv_groups = 8;
    l.processor_map = 0xff;
    l.output_processor_map = 0xff;
    l.padding = [1, 1];
    l.out_offset = 0x2000;
    l.weights = ramp_weights(8, 1, 9);
    l.bias = Some((0i8..8).map(|i| i * 2 - 8).collect());

    (Network::new(vec![l]), ramp_frame(8, 16, 16))
}
