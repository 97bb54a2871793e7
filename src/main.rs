use clap::{Parser, Subcommand};
use evio::block::BlockHeader;
use evio::dictionary::{NameProvider, NumericNameProvider};
use evio::{ByteOrder, CompactReader, EventWriter, NodeId, ReaderOptions, WriterOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "evio", about = "Inspect and rewrite evio event files")]
struct Cli {
    /// Reader options as JSON (initial_position, eager_scan)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the first block header and file-wide counts
    Info {
        input: PathBuf,
    },
    /// One line per block
    Blocks {
        input: PathBuf,
    },
    /// Print the structure tree of one event (or all of them)
    Tree {
        input: PathBuf,
        /// 1-based event number
        #[arg(short, long)]
        event: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Hex-dump the payloads of structures matching tag/num in one event
    Dump {
        input: PathBuf,
        #[arg(short, long)]
        event: usize,
        #[arg(short, long)]
        tag: u16,
        #[arg(short, long, default_value = "0")]
        num: u8,
        /// Dump from a private copy instead of the mapped buffer
        #[arg(long)]
        copy: bool,
    },
    /// Parse every event and write a fresh version-4 file
    Convert {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// big or little; defaults to the input's byte order
        #[arg(short, long)]
        byte_order: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_target(false)
        .init();

    let options = match &cli.config {
        Some(path) => serde_json::from_str::<ReaderOptions>(&std::fs::read_to_string(path)?)?,
        None       => ReaderOptions::default(),
    };

    match cli.command {

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let reader = open(&input, options)?;
            let h = reader.first_block_header();
            println!("── evio file ────────────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Version        {}", reader.evio_version());
            println!("  Byte order     {}", reader.byte_order());
            println!("  Block size     {} words", h.size());
            println!("  Header length  {} words", h.header_length());
            println!("  Blocks         {}", reader.block_count());
            println!("  Events         {}", reader.event_count());
            println!("  Dictionary     {}", reader.has_dictionary());
            if let Some(xml) = reader.dictionary_xml() {
                println!("{}", xml);
            }
        }

        // ── Blocks ───────────────────────────────────────────────────────────
        Commands::Blocks { input } => {
            let reader = open(&input, options)?;
            println!("{:>6} {:>8} {:>12} {:>10} {:>7} {:>5} {:>5}",
                     "Place", "Number", "Offset", "Words", "Events", "Dict", "Last");
            for b in reader.blocks() {
                println!("{:>6} {:>8} {:>12} {:>10} {:>7} {:>5} {:>5}",
                    b.place, b.header.number(), b.pos, b.len, b.count,
                    b.header.has_dictionary(), b.header.is_last_block());
            }
        }

        // ── Tree ─────────────────────────────────────────────────────────────
        Commands::Tree { input, event, json } => {
            let mut reader = open(&input, options)?;
            let events: Vec<usize> = match event {
                Some(n) => vec![n],
                None    => (1..=reader.event_count()).collect(),
            };
            let mut summaries = Vec::with_capacity(events.len());
            for n in events {
                let id = reader.scanned_event(n)?;
                if json {
                    summaries.push(reader.arena().summary(id)?);
                } else {
                    println!("event {}", n);
                    print_tree(&reader, &NumericNameProvider, id)?;
                }
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            }
        }

        // ── Dump ─────────────────────────────────────────────────────────────
        Commands::Dump { input, event, tag, num, copy } => {
            let mut reader = open(&input, options)?;
            let hits = reader.search_event(event, tag, num)?;
            if hits.is_empty() {
                println!("No structure {}/{} in event {}", tag, num, event);
            }
            for id in hits {
                let node = reader.node(id)?;
                println!("{} {}/{} {} at offset {}", node.kind, node.tag, node.num, node.data_type, node.pos);
                let bytes = if node.data_type.is_structure() {
                    reader.structure_bytes(id, copy)?.into_owned()
                } else if copy {
                    reader.data_copy(id)?.bytes
                } else {
                    reader.data(id)?.as_bytes().to_vec()
                };
                for (i, line) in bytes.chunks(16).enumerate() {
                    println!("  {:08x}  {}", 16 * i, hex::encode(line));
                }
            }
        }

        // ── Convert ──────────────────────────────────────────────────────────
        Commands::Convert { input, output, byte_order } => {
            let reader = open(&input, options)?;
            let order = match byte_order.as_deref() {
                Some(name) => ByteOrder::from_name(name)
                    .ok_or_else(|| format!("unknown byte order '{}'", name))?,
                None => reader.byte_order(),
            };
            let events = reader.parse_all_events()?;
            let opts = WriterOptions {
                byte_order: order,
                dictionary_xml: reader.dictionary_xml().map(str::to_string),
                ..WriterOptions::default()
            };
            let mut writer = EventWriter::new(BufWriter::new(std::fs::File::create(&output)?), opts)?;
            for ev in &events {
                writer.write_event(ev)?;
            }
            let blocks = writer.blocks_written() + 1;
            writer.finish()?;
            println!("Wrote {} events in {} blocks → {}", events.len(), blocks, output.display());
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn open(path: &Path, options: ReaderOptions) -> Result<CompactReader, Box<dyn std::error::Error>> {
    Ok(CompactReader::from_file(path, options)?)
}

fn print_tree(reader: &CompactReader, names: &dyn NameProvider,
              root: NodeId) -> Result<(), Box<dyn std::error::Error>> {
    // ancestors' tag/num, outermost first, kept in step with the stack depth
    let mut context: Vec<(u16, u8)> = Vec::new();
    let mut stack = vec![(root, 0usize)];
    while let Some((id, depth)) = stack.pop() {
        let node = reader.node(id)?;
        context.truncate(depth);
        let indent = "  ".repeat(depth + 1);
        let name = names.name_for(node.tag, node.num, &context);
        println!("{}{} {} [{}] len={} pad={} @{}",
                 indent, node.kind, name, node.data_type, node.len, node.pad, node.pos);
        context.push((node.tag, node.num));
        stack.extend(node.children.iter().rev().map(|c| (*c, depth + 1)));
    }
    Ok(())
}
