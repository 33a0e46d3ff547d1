use anyhow::Context;
use clap::{ArgAction, Parser};
use f4vbox::{
    BoxKey, BoxValue, F4vParser, FourCC, LeafPayload, Mp4Box, NodeKind, ParserConfig, find_path,
    known_boxes::KnownBox,
    util::hex_dump,
};
use std::fs::File;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(version, about = "ISO-BMFF / F4V box tree explorer")]
struct Args {
    /// MP4/F4V file path
    path: PathBuf,

    /// Only print the subtree at a dotted path (e.g. moov.trak[1].mdia)
    #[arg(long = "filter")]
    filter: Option<String>,

    /// Dump raw payload of this 4CC (e.g. --raw stsd) or uuid:xxxxxxxx...
    #[arg(long = "raw")]
    raw: Option<String>,

    /// Maximum container nesting before parsing fails
    #[arg(long, default_value_t = f4vbox::config::DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Print decoded fields of recognized boxes
    #[arg(long, action = ArgAction::SetTrue)]
    decode: bool,

    /// Show bytes count when dumping raw (0 means entire box payload)
    #[arg(long, default_value_t = 0)]
    bytes: u64,

    /// Byte offset where the top-level box sequence starts
    #[arg(long, default_value_t = 0)]
    offset: u64,

    /// Emit JSON instead of human-readable tree
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let config = ParserConfig::default()
        .with_max_depth(args.max_depth)
        .with_start_offset(args.offset);
    let parsed = F4vParser::new(config).parse_all(args.path.clone());
    let top = &parsed.boxes;

    let targets: Vec<&Mp4Box> = match &args.filter {
        Some(path) => find_path(top, path).into_iter().collect(),
        None => top.iter().collect(),
    };

    // JSON mode: output JSON and exit (no tree or raw to keep output clean)
    if args.json {
        println!("{}", serde_json::to_string_pretty(&targets)?);
    } else {
        for b in &targets {
            print_box(b, 0, args.decode);
        }
        if let Some(sel) = args.raw.as_ref() {
            dump_raw(&args.path, top, sel, args.bytes)?;
        }
    }

    match parsed.error {
        None => Ok(()),
        Some(e) => Err(e).with_context(|| {
            format!(
                "{}: parsing stopped after {} top-level boxes",
                args.path.display(),
                top.len()
            )
        }),
    }
}

// ---------- Human-readable tree ----------

fn print_box(b: &Mp4Box, depth: usize, decode: bool) {
    let indent = "  ".repeat(depth);
    let name = KnownBox::from(b.typ()).full_name();
    match &b.kind {
        NodeKind::Container { full, children } => {
            let full = full
                .map(|f| format!(" (ver={}, flags=0x{:06x})", f.version, f.flags))
                .unwrap_or_default();
            println!(
                "{indent}{:>8} {:>10} {} [{}] (container){}",
                format!("{:#x}", b.start()),
                b.size,
                b.key(),
                name,
                full
            );
            for c in children {
                print_box(c, depth + 1, decode);
            }
        }
        NodeKind::Leaf(payload) => {
            println!(
                "{indent}{:>8} {:>10} {} [{}]",
                format!("{:#x}", b.start()),
                b.size,
                b.key(),
                name
            );
            if decode {
                if let LeafPayload::Decoded(v) = payload {
                    println!("{indent}         -> {}", summarize(v));
                }
            }
        }
    }
}

fn summarize(v: &BoxValue) -> String {
    match v {
        BoxValue::Bytes(bytes) => format!("{} bytes", bytes.len()),
        BoxValue::Structured(data) => {
            serde_json::to_string(data).unwrap_or_else(|e| format!("[unprintable: {}]", e))
        }
    }
}

// ---------- Raw dump ----------

fn dump_raw(path: &Path, boxes: &[Mp4Box], sel: &str, limit: u64) -> anyhow::Result<()> {
    let mut f = File::open(path).with_context(|| format!("reopening {}", path.display()))?;
    let matches: Vec<&Mp4Box> = boxes
        .iter()
        .flat_map(|b| b.walk())
        .map(|(_, b)| b)
        .filter(|b| selects(b.key(), sel))
        .collect();

    for (i, b) in matches.into_iter().enumerate() {
        let mut range = b.payload_range();
        if limit != 0 && limit < range.len {
            range.len = limit;
        }
        let data = range.materialize(&mut f)?;
        println!(
            "\n== Dump {} ({}) payload: offset={:#x}, len={} ==",
            i,
            b.key(),
            range.offset,
            range.len
        );
        print!("{}", hex_dump(&data, range.offset));
    }
    Ok(())
}

fn selects(key: BoxKey, sel: &str) -> bool {
    match key {
        BoxKey::Uuid(u) => sel
            .strip_prefix("uuid:")
            .is_some_and(|h| hex::encode(u).starts_with(&h.to_ascii_lowercase())),
        BoxKey::FourCC(cc) => FourCC::from_str(sel) == Some(cc),
    }
}
