//! sarx CLI: render templates, splice includes, profile event pipelines.

#[cfg(feature = "fast-alloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::{Args, Parser, Subcommand};
use sarx::{
    EventBuffer, FastHashMap, FilterOptions, IncludingSerializer, ParameterizedEventBuffer,
    Parameters, ParseOptions, PassthroughFilter, Pipeline, WhitespaceMode, XmlSerializer,
};
use std::io::{BufWriter, IsTerminal, Read, Write};
use std::process;

#[derive(Parser)]
#[command(name = "sarx", about = "Record, replay and rewrite XML event streams")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve {name} placeholders in a template
    Render(RenderArgs),
    /// Splice raw fragments into a page at include elements
    Include(IncludeArgs),
    /// Time a pipeline of pass-through stages
    Profile(ProfileArgs),
    /// List the recorded events, one per line
    Dump(DumpArgs),
}

#[derive(Args)]
struct IoArgs {
    /// Input file (- for stdin)
    #[arg(short, long)]
    input: String,

    /// Output file (- or omitted = stdout)
    #[arg(short, long)]
    output: Option<String>,

    /// Report whitespace between elements as character data instead of dropping it
    #[arg(long)]
    keep_whitespace: bool,
}

impl IoArgs {
    fn parse_options(&self) -> ParseOptions {
        let whitespace = if self.keep_whitespace {
            WhitespaceMode::Characters
        } else {
            WhitespaceMode::Strip
        };
        ParseOptions::default().with_whitespace(whitespace)
    }
}

#[derive(Args)]
struct RenderArgs {
    #[command(flatten)]
    io: IoArgs,

    /// Text parameter NAME=VALUE (repeatable)
    #[arg(short, long = "param", value_name = "NAME=VALUE")]
    params: Vec<String>,

    /// Fragment parameter NAME=FILE, replayed as events (repeatable)
    #[arg(short, long = "fragment", value_name = "NAME=FILE")]
    fragments: Vec<String>,

    /// Keep the root element of fragment files
    #[arg(long)]
    keep_root: bool,

    /// Write an XML declaration
    #[arg(long)]
    declaration: bool,
}

#[derive(Args)]
struct IncludeArgs {
    #[command(flatten)]
    io: IoArgs,

    /// Raw content for an include SRC=FILE (repeatable)
    #[arg(short, long = "fragment", value_name = "SRC=FILE")]
    fragments: Vec<String>,

    /// Substitution token character (used doubled)
    #[arg(long, default_value_t = '~')]
    token: char,
}

#[derive(Args)]
struct ProfileArgs {
    #[command(flatten)]
    io: IoArgs,

    /// Number of transparent relay stages
    #[arg(long, default_value_t = 1)]
    stages: usize,

    /// Add a stage that drops the root element
    #[arg(long)]
    strip_root: bool,

    /// Report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct DumpArgs {
    #[command(flatten)]
    io: IoArgs,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Render(args) => run_render(&args),
        Command::Include(args) => run_include(&args),
        Command::Profile(args) => run_profile(&args),
        Command::Dump(args) => run_dump(&args),
    };
    if let Err(e) = result {
        eprintln!("Fehler: {e}");
        process::exit(1);
    }
}

fn read_input(path: &str) -> Result<String, String> {
    if path == "-" {
        if std::io::stdin().is_terminal() {
            eprintln!("Lese von stdin (Ctrl+D zum Beenden)...");
        }
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| format!("Lesefehler (stdin): {e}"))?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path).map_err(|e| format!("Lesefehler '{path}': {e}"))
    }
}

fn open_output(path: Option<&str>) -> Result<BufWriter<Box<dyn Write>>, String> {
    match path {
        None | Some("-") => Ok(BufWriter::new(Box::new(std::io::stdout()))),
        Some(path) => {
            let file = std::fs::File::create(path).map_err(|e| format!("Schreibfehler '{path}': {e}"))?;
            Ok(BufWriter::new(Box::new(file)))
        }
    }
}

/// `NAME=VALUE` zerlegen.
fn split_assignment(arg: &str) -> Result<(&str, &str), String> {
    arg.split_once('=')
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("erwartet NAME=WERT, war '{arg}'"))
}

fn parse_events(path: &str, options: &ParseOptions) -> Result<EventBuffer, String> {
    let xml = read_input(path)?;
    EventBuffer::from_xml_str(&xml, options).map_err(|e| format!("Parse-Fehler '{path}': {e}"))
}

fn run_render(args: &RenderArgs) -> Result<(), String> {
    let options = args.io.parse_options();
    let xml = read_input(&args.io.input)?;
    let template = ParameterizedEventBuffer::from_xml_str(&xml, &options)
        .map_err(|e| format!("Parse-Fehler '{}': {e}", args.io.input))?;

    let mut params = Parameters::new();
    for arg in &args.params {
        let (name, value) = split_assignment(arg)?;
        params.insert(name, value);
    }
    let filter_options = FilterOptions::default().with_suppress_root_element(!args.keep_root);
    for arg in &args.fragments {
        let (name, path) = split_assignment(arg)?;
        let events = parse_events(path, &options)?;
        let mut filter = PassthroughFilter::new(EventBuffer::new(), filter_options);
        events
            .to_sink(&mut filter)
            .map_err(|e| format!("Fragment '{name}': {e}"))?;
        params.insert(name, filter.into_inner());
    }

    for name in template.parameter_names().filter(|n| !params.contains(n)) {
        eprintln!("Hinweis: Parameter '{name}' nicht gesetzt, bleibt leer");
    }

    let writer = open_output(args.io.output.as_deref())?;
    let mut ser = XmlSerializer::new(writer).with_declaration(args.declaration);
    template
        .to_sink(&mut ser, &params)
        .map_err(|e| format!("Render-Fehler: {e}"))?;
    ser.finish()
        .and_then(|mut w| Ok(w.flush()?))
        .map_err(|e| format!("Schreibfehler: {e}"))
}

fn run_include(args: &IncludeArgs) -> Result<(), String> {
    let token = u8::try_from(args.token)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| format!("Token '{}' ist kein ASCII-Zeichen", args.token))?;
    let page = parse_events(&args.io.input, &args.io.parse_options())?;

    let mut fragments: FastHashMap<String, String> = FastHashMap::default();
    for arg in &args.fragments {
        let (src, path) = split_assignment(arg)?;
        fragments.insert(src.to_string(), read_input(path)?);
    }

    let writer = open_output(args.io.output.as_deref())?;
    let mut ser = IncludingSerializer::with_token(writer, token, fragments).map_err(|e| e.to_string())?;
    page.to_sink(&mut ser).map_err(|e| format!("Include-Fehler: {e}"))?;
    ser.finish()
        .and_then(|mut w| Ok(w.flush()?))
        .map_err(|e| format!("Schreibfehler: {e}"))
}

fn run_profile(args: &ProfileArgs) -> Result<(), String> {
    let source = parse_events(&args.io.input, &args.io.parse_options())?;

    let mut pipeline = Pipeline::new().profiled(true).capture_fragments(false);
    for i in 1..=args.stages {
        pipeline = pipeline.filter(format!("relay-{i}"), FilterOptions::transparent());
    }
    if args.strip_root {
        pipeline = pipeline.filter(
            "strip-root",
            FilterOptions::transparent().with_suppress_root_element(true),
        );
    }

    let sink = XmlSerializer::new(std::io::sink());
    let report = pipeline
        .run(&source, sink)
        .map_err(|e| format!("Pipeline-Fehler: {e}"))?
        .ok_or("interner Fehler: kein Report")?;

    let mut out = open_output(args.io.output.as_deref())?;
    let text = if args.json { report.to_json() } else { report.to_string() };
    writeln!(out, "{text}")
        .and_then(|()| out.flush())
        .map_err(|e| format!("Schreibfehler: {e}"))
}

fn run_dump(args: &DumpArgs) -> Result<(), String> {
    let events = parse_events(&args.io.input, &args.io.parse_options())?;
    let mut out = open_output(args.io.output.as_deref())?;
    events.dump(&mut out).map_err(|e| format!("Schreibfehler: {e}"))?;
    out.flush().map_err(|e| format!("Schreibfehler: {e}"))
}
