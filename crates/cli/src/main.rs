//! RV32/AXI4 simulator CLI.
//!
//! This binary couples the simulator core to the reference DDR model and
//! drives the bus clock. It performs:
//! 1. **Setup:** Parses arguments, loads the optional JSON config, loads the
//!    image into both the simulator and the DDR backing store.
//! 2. **Clock loop:** Samples DDR outputs, steps the simulator, forwards
//!    master outputs back, ticks the DDR.
//! 3. **Sidebands:** Prints UART bytes to stdout and optionally emits a
//!    per-cycle AXI trace CSV.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;

use clap::Parser;

use rvaxi_core::Config;
use rvaxi_core::axi::{AxiInputs, AxiOutputs, AxiSlave, SimDdr};
use rvaxi_core::sim::{SimStatus, Simulator, StepOutcome};

#[derive(Parser, Debug)]
#[command(
    name = "rvaxi",
    author,
    version,
    about = "Cycle-stepped RV32IMA/Zfinx simulator over AXI4",
    long_about = "Runs a raw RV32 binary image against the reference DDR model, \
                  one bus cycle per iteration.\n\nExamples:\n  \
                  rvaxi image.bin\n  \
                  rvaxi image.bin --max-inst 1000000\n  \
                  rvaxi image.bin --trace-file axi4_trace.csv"
)]
struct Cli {
    /// Raw binary image loaded at 0x80000000.
    image: PathBuf,

    /// Maximum executed instructions (halts with success).
    #[arg(long)]
    max_inst: Option<u64>,

    /// Maximum simulated cycles (halts with failure).
    #[arg(long)]
    max_cycles: Option<u64>,

    /// JSON configuration file; CLI flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit a per-cycle AXI channel trace CSV to this path.
    #[arg(long)]
    trace_file: Option<PathBuf>,

    /// Stop tracing after this many cycles.
    #[arg(long)]
    trace_max_cycles: Option<u64>,

    /// Print the statistics report after the run.
    #[arg(long)]
    stats: bool,
}

/// Per-cycle CSV writer for every AXI channel signal.
struct AxiTraceWriter {
    file: BufWriter<File>,
    emitted: u64,
    max_cycles: u64,
}

impl AxiTraceWriter {
    fn create(path: &PathBuf, max_cycles: u64) -> std::io::Result<Self> {
        let mut file = BufWriter::new(File::create(path)?);
        writeln!(
            file,
            "cycle,arvalid,arready,arid,araddr,arlen,arsize,\
             awvalid,awready,awid,awaddr,awlen,awsize,\
             wvalid,wready,wdata,wstrb,wlast,\
             rvalid,rready,rid,rdata,rlast,\
             bvalid,bready,bid,bresp"
        )?;
        Ok(Self {
            file,
            emitted: 0,
            max_cycles,
        })
    }

    fn emit(&mut self, status: &SimStatus, axi_in: &AxiInputs, axi_out: &AxiOutputs) {
        if self.emitted >= self.max_cycles {
            return;
        }
        let b = |v: bool| v as u8;
        let _ = writeln!(
            self.file,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            status.sim_time,
            b(axi_out.arvalid),
            b(axi_in.arready),
            axi_out.arid,
            axi_out.araddr,
            axi_out.arlen,
            axi_out.arsize,
            b(axi_out.awvalid),
            b(axi_in.awready),
            axi_out.awid,
            axi_out.awaddr,
            axi_out.awlen,
            axi_out.awsize,
            b(axi_out.wvalid),
            b(axi_in.wready),
            axi_out.wdata,
            axi_out.wstrb,
            b(axi_out.wlast),
            b(axi_in.rvalid),
            b(axi_out.rready),
            axi_in.rid,
            axi_in.rdata,
            b(axi_in.rlast),
            b(axi_in.bvalid),
            b(axi_out.bready),
            axi_in.bid,
            axi_in.bresp,
        );
        self.emitted += 1;
    }
}

fn main() {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).unwrap_or_else(|e| {
                eprintln!("[!] cannot read config '{}': {}", path.display(), e);
                process::exit(1);
            });
            Config::from_json(&text).unwrap_or_else(|e| {
                eprintln!("[!] invalid config '{}': {}", path.display(), e);
                process::exit(1);
            })
        }
        None => Config::default(),
    };
    if let Some(max_inst) = cli.max_inst {
        config.limits.max_inst = max_inst;
    }
    if let Some(max_cycles) = cli.max_cycles {
        config.limits.max_cycles = max_cycles;
    }

    let mut sim = Simulator::new(config.clone()).unwrap_or_else(|e| {
        eprintln!("[!] {}", e);
        process::exit(1);
    });

    let image = std::fs::read(&cli.image).unwrap_or_else(|e| {
        eprintln!("[!] cannot read image '{}': {}", cli.image.display(), e);
        process::exit(1);
    });
    let image_size = sim.load_image_bytes(&image).unwrap_or_else(|e| {
        eprintln!("[!] {}", e);
        process::exit(1);
    });

    let mut ddr = SimDdr::new(
        config.memory.ddr_read_latency,
        config.memory.ddr_write_latency,
    );
    ddr.preload_image(&image);
    ddr.tick();

    let mut trace = cli.trace_file.as_ref().map(|path| {
        AxiTraceWriter::create(path, cli.trace_max_cycles.unwrap_or(u64::MAX)).unwrap_or_else(
            |e| {
                eprintln!("[!] cannot open trace file '{}': {}", path.display(), e);
                process::exit(1);
            },
        )
    });

    println!(
        "[rvaxi] image={} size={} max_inst={} max_cycles={}",
        cli.image.display(),
        image_size,
        config.limits.max_inst,
        config.limits.max_cycles
    );

    let mut axi_out = AxiOutputs::default();
    let mut status = SimStatus::default();
    let mut last_progress = 0u64;
    let progress_interval = config.general.progress_interval;

    let outcome = loop {
        let axi_in = ddr.sample_outputs();
        let outcome = sim.step(&axi_in, &mut axi_out, &mut status);

        if let Some(trace) = trace.as_mut() {
            trace.emit(&status, &axi_in, &axi_out);
        }
        if status.uart_valid {
            print!("{}", status.uart_ch as char);
            let _ = std::io::stdout().flush();
        }

        ddr.drive_inputs(&axi_out);
        ddr.tick();

        if progress_interval > 0
            && status.inst_count / progress_interval != last_progress / progress_interval
        {
            println!(
                "[rvaxi] inst={} sim_time={}",
                status.inst_count, status.sim_time
            );
            last_progress = status.inst_count;
        }

        if outcome.is_halted() {
            break outcome;
        }
    };

    if cli.stats {
        sim.print_stats();
    }

    match outcome {
        StepOutcome::HaltedSuccess => {
            println!("-----------------------------");
            println!("Success");
            if status.inst_count >= config.limits.max_inst {
                println!("reason=max_inst_reached");
            }
            println!(
                "inst_count={} sim_time={}",
                status.inst_count, status.sim_time
            );
            println!("-----------------------------");
        }
        _ => {
            println!("------------------------------");
            println!("TIME OUT / ABORT");
            println!(
                "inst_count={} sim_time={}",
                status.inst_count, status.sim_time
            );
            if !sim.last_error().is_empty() {
                println!("error={}", sim.last_error());
            }
            println!("------------------------------");
            process::exit(1);
        }
    }
}
