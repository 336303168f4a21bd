//! Validate a schema and print its layout and fingerprint summary.
//!
//! Usage:
//!   messgen --types DIR [--types DIR ...] [--protocol BASEDIR:NAME ...] [--manifest OUTDIR] [-v]
//!
//! Exits with status 1 if the schema fails to load. `RUST_LOG` overrides the log filter.

use anyhow::Context;
use clap::Parser;
use messgen::loader::{load_protocols, load_type_dirs};
use messgen::manifest::write_manifests;
use messgen::{ProtocolSource, Schema, TypeClass};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "messgen", version, about = "Validate message schemas and print fingerprints")]
struct Args {
    /// Directory of type descriptors (repeatable)
    #[arg(long = "types", value_name = "DIR", required = true)]
    types: Vec<PathBuf>,

    /// Protocol as BASEDIR:namespace/of/proto (repeatable)
    #[arg(long = "protocol", value_name = "BASEDIR:NAME")]
    protocols: Vec<ProtocolSource>,

    /// Write types.json and protocols.json into this directory
    #[arg(long, value_name = "OUTDIR")]
    manifest: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let types = load_type_dirs(&args.types).context("reading type descriptors")?;
    let protocols = load_protocols(&args.protocols).context("reading protocol descriptors")?;
    let schema = Schema::load(&types, &protocols).context("loading schema")?;
    info!(types = types.len(), protocols = protocols.len(), "schema loaded");

    for def in schema.types() {
        if !matches!(def.type_class(), TypeClass::Struct | TypeClass::Enum | TypeClass::Bitset) {
            continue;
        }
        let layout = schema.layout(&def.name)?;
        let size = layout.size.map_or_else(|| "dynamic".to_string(), |s| s.to_string());
        println!(
            "type {} {} size={} align={} flat={} hash={:#018x}",
            def.name,
            def.type_class(),
            size,
            layout.alignment,
            layout.flat,
            schema.type_hash(&def.name)?
        );
        let groups = schema.field_groups(&def.name)?;
        if groups.len() > 1 {
            for group in groups {
                println!("  group [{}] flat={}", group.fields.join(", "), group.flat);
            }
        }
    }

    for proto in schema.protocols()? {
        println!("protocol {} id={} fingerprint={:#018x}", proto.proto_name, proto.proto_id, proto.proto_hash);
        for msg in &proto.messages {
            println!(
                "  {:>5} {} : {} hash={:#018x}",
                msg.message_id, msg.message_name, msg.type_name, msg.message_hash
            );
        }
    }

    if let Some(out_dir) = &args.manifest {
        let written = write_manifests(&schema, out_dir)
            .with_context(|| format!("writing manifest to {}", out_dir.display()))?;
        for path in written {
            info!(path = %path.display(), "wrote manifest");
        }
    }
    Ok(())
}
