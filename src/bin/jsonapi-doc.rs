//! jsonapi-doc CLI
//!
//! Renders JSON records as JSON:API documents and checks documents against
//! the JSON:API structure.

use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use clap::{Parser, Subcommand};
use jsonapi_doc::{
    load_json, load_json_auto, load_json_str, serialize, validate_document, Context, Fieldsets,
    Primary, Record, Resource, SchemaConfig, SerializeOptions, Store, ValidateError,
};
use serde_json::{json, Value};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser)]
#[command(name = "jsonapi-doc")]
#[command(about = "Render and validate JSON:API compound documents")]
#[command(version)]
struct Cli {
    /// Log resolution steps to stderr (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render records of one kind as a JSON:API document
    Serialize {
        /// Schema source: file path or URL (http:// or https://)
        #[arg(long)]
        schema: String,

        /// Record data source: file path or URL
        #[arg(long)]
        data: String,

        /// Kind of the primary records
        #[arg(long)]
        kind: String,

        /// Render the single record with this id
        #[arg(long, conflicts_with = "collection", required_unless_present = "collection")]
        id: Option<String>,

        /// Render every record of the kind as a collection
        #[arg(long, conflicts_with = "id", required_unless_present = "id")]
        collection: bool,

        /// Relationship paths to include (repeatable, comma-separated)
        #[arg(long)]
        include: Vec<String>,

        /// Sparse fieldset as TYPE=FIELD1,FIELD2 (repeatable)
        #[arg(long, value_parser = parse_fieldset)]
        fields: Vec<(String, String)>,

        /// Context object passed to if/unless conditions (JSON)
        #[arg(long)]
        context: Option<String>,

        /// Prefix for generated links
        #[arg(long, default_value = "")]
        base_url: String,

        /// Use the schema's declarations for this namespace
        #[arg(long)]
        namespace: Option<String>,

        /// Top-level meta object (JSON)
        #[arg(long)]
        meta: Option<String>,

        /// Emit a top-level jsonapi member with this version
        #[arg(long)]
        jsonapi_version: Option<String>,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Validate the rendered document before writing it
        #[arg(long)]
        check: bool,
    },

    /// Check a document against the JSON:API document structure
    Validate {
        /// Document file to validate
        document: PathBuf,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },
}

fn parse_fieldset(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((type_name, fields)) if !type_name.trim().is_empty() => {
            Ok((type_name.trim().to_string(), fields.to_string()))
        }
        _ => Err(format!("expected TYPE=FIELD1,FIELD2, got '{}'", s)),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "jsonapi_doc=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(filter);
    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry().with(layer).try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Serialize {
            schema,
            data,
            kind,
            id,
            collection,
            include,
            fields,
            context,
            base_url,
            namespace,
            meta,
            jsonapi_version,
            output,
            pretty,
            check,
        } => run_serialize(SerializeArgs {
            schema,
            data,
            kind,
            id,
            collection,
            include,
            fields,
            context,
            base_url,
            namespace,
            meta,
            jsonapi_version,
            output,
            pretty,
            check,
        }),

        Commands::Validate { document, json } => run_validate(&document, json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

struct SerializeArgs {
    schema: String,
    data: String,
    kind: String,
    id: Option<String>,
    collection: bool,
    include: Vec<String>,
    fields: Vec<(String, String)>,
    context: Option<String>,
    base_url: String,
    namespace: Option<String>,
    meta: Option<String>,
    jsonapi_version: Option<String>,
    output: Option<PathBuf>,
    pretty: bool,
    check: bool,
}

fn run_serialize(args: SerializeArgs) -> Result<(), u8> {
    let schema = load_json_auto(&args.schema)
        .and_then(SchemaConfig::from_value)
        .map_err(|e| {
            eprintln!("Error: loading schema: {}", e);
            e.exit_code() as u8
        })?;
    let registry = schema.to_registry().map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let data = load_json_auto(&args.data).map_err(|e| {
        eprintln!("Error: loading data: {}", e);
        e.exit_code() as u8
    })?;
    let store = Store::from_json(&data, &schema).map_err(|e| {
        eprintln!("Error: loading data: {}", e);
        e.exit_code() as u8
    })?;

    if schema.id_field(&args.kind).is_none() {
        eprintln!("Error: kind '{}' is not declared in the schema", args.kind);
        return Err(2);
    }

    let mut options = SerializeOptions::new().base_url(args.base_url);
    if !args.include.is_empty() {
        options = options.include(&args.include);
    }
    if !args.fields.is_empty() {
        let mut fieldsets = Fieldsets::new();
        for (type_name, fields) in &args.fields {
            fieldsets.insert(type_name.clone(), fields.split(','));
        }
        options = options.fields(fieldsets);
    }
    if let Some(context) = &args.context {
        options = options.context(parse_object("--context", context)?);
    }
    if let Some(meta) = &args.meta {
        options = options.meta(Value::Object(parse_object("--meta", meta)?));
    }
    if let Some(version) = args.jsonapi_version {
        options = options.jsonapi(json!({ "version": version }));
    }
    if let Some(namespace) = args.namespace {
        options = options.namespace(namespace);
    }

    let records: Vec<Rc<Record>> = match &args.id {
        Some(id) => match store.get(&args.kind, id) {
            Some(record) => vec![record],
            None => {
                eprintln!("Error: no '{}' record with id '{}'", args.kind, id);
                return Err(2);
            }
        },
        None => store.all(&args.kind),
    };
    let primary = if args.collection {
        options = options.collection(true);
        Primary::many(records.iter().map(|r| &**r as &dyn Resource))
    } else {
        records
            .first()
            .map(|r| Primary::one(&**r))
            .unwrap_or(Primary::Null)
    };

    let document = serialize(&registry, primary, &options).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    if args.check {
        if let Err(e) = validate_document(&document) {
            report_validation(&e, false);
            return Err(e.exit_code() as u8);
        }
    }

    let rendered = if args.pretty {
        serde_json::to_string_pretty(&document)
    } else {
        serde_json::to_string(&document)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, &rendered).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", rendered);
        }
    }

    Ok(())
}

fn parse_object(flag: &str, raw: &str) -> Result<Context, u8> {
    match load_json_str(raw) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => {
            eprintln!("Error: {} must be a JSON object", flag);
            Err(2)
        }
        Err(e) => {
            eprintln!("Error: {}: {}", flag, e);
            Err(e.exit_code() as u8)
        }
    }
}

fn run_validate(path: &std::path::Path, json_output: bool) -> Result<(), u8> {
    let document = load_json(path).map_err(|e| {
        report_error(json_output, &format!("loading document: {}", e));
        e.exit_code() as u8
    })?;

    match validate_document(&document) {
        Ok(()) => {
            if json_output {
                println!(r#"{{"valid":true}}"#);
            } else {
                println!("Valid");
            }
            Ok(())
        }
        Err(e) => {
            report_validation(&e, json_output);
            Err(e.exit_code() as u8)
        }
    }
}

fn report_validation(error: &ValidateError, json_output: bool) {
    match error {
        ValidateError::Invalid { errors } => {
            if json_output {
                let output = json!({
                    "valid": false,
                    "errors": errors
                });
                println!("{}", output);
            } else {
                eprintln!("Validation failed:");
                for error in errors {
                    eprintln!("  {}", error);
                }
            }
        }
        ValidateError::InvalidSchema { .. } => report_error(json_output, &error.to_string()),
    }
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}
