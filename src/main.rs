use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ldap_ops::{
    AttributeValue, Config, Connection, PendingOperation, RenameOptions, SearchCriteria, SearchItem,
    Table, Value,
};
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "ldap-ops")]
#[command(about = "LDAP v3 client - add, delete, compare, modify, rename and search directory entries")]
struct Args {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Server host(s) or URI (overrides config; e.g. ldap://localhost:389)
    #[arg(short = 'H', long, value_name = "URI")]
    uri: Option<String>,

    /// Negotiate StartTLS after connecting
    #[arg(short = 'Z', long)]
    starttls: bool,

    /// Bind DN (overrides config)
    #[arg(short = 'D', long, value_name = "DN")]
    binddn: Option<String>,

    /// Bind password (overrides config)
    #[arg(short = 'w', long, value_name = "PASSWORD")]
    password: Option<String>,

    /// Result timeout in seconds (0 blocks)
    #[arg(short, long, value_name = "SECS")]
    timeout: Option<f64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search and print entries as LDIF
    Search {
        #[arg(short, long, value_name = "DN")]
        base: Option<String>,
        /// base, onelevel or subtree
        #[arg(short, long)]
        scope: Option<String>,
        #[arg(short = 'z', long)]
        sizelimit: Option<i32>,
        /// Print attribute names only
        #[arg(short = 'A', long)]
        attrsonly: bool,
        filter: Option<String>,
        attrs: Vec<String>,
    },
    /// Add an entry; attributes come from a YAML mapping
    Add { dn: String, file: PathBuf },
    /// Modify an entry; groups come from a YAML list of {op, attrs}
    Modify { dn: String, file: PathBuf },
    Delete { dn: String },
    Compare { dn: String, attribute: String, value: String },
    Rename {
        dn: String,
        new_rdn: String,
        #[arg(long, value_name = "DN")]
        new_parent: Option<String>,
        #[arg(long)]
        delete_old_rdn: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("ldap_ops={},info", log_level))
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => {
            info!("Configuration source: file {:?}", path);
            Config::from_file(path).with_context(|| format!("Load config {:?}", path))?
        }
        None => Config::default(),
    };
    if let Some(uri) = args.uri.clone() {
        config.connection.uri = uri;
    }
    if args.starttls {
        config.connection.starttls = Some(true);
    }
    if let Some(timeout) = args.timeout {
        config.connection.timeout_secs = Some(timeout);
    }
    if args.binddn.is_some() || args.password.is_some() {
        let bind = config.connection.bind.get_or_insert(ldap_ops::config::BindConfig {
            who: None,
            password: None,
        });
        if args.binddn.is_some() {
            bind.who = args.binddn.clone();
        }
        if args.password.is_some() {
            bind.password = args.password.clone();
        }
    }

    let conn = config.open()?;
    let outcome = run(&conn, args.command, args.timeout);
    conn.close();
    if let Err(e) = &outcome {
        error!("{:#}", e);
    }
    outcome
}

fn run(conn: &Connection, command: Command, timeout: Option<f64>) -> Result<()> {
    match command {
        Command::Search { base, scope, sizelimit, attrsonly, filter, attrs } => {
            let mut criteria = SearchCriteria {
                base,
                scope,
                filter,
                attrsonly,
                sizelimit,
                timeout,
                ..SearchCriteria::default()
            };
            if !attrs.is_empty() {
                criteria = criteria.attrs(attrs);
            }
            let cursor = conn.search(&criteria)?;
            let mut count = 0;
            for item in cursor {
                match item? {
                    SearchItem::Entry(entry) => {
                        count += 1;
                        println!("dn: {}", entry.dn);
                        for (name, value) in &entry.attributes {
                            print_attribute(name, value);
                        }
                        println!();
                    }
                    SearchItem::Referral(uris) => {
                        for uri in uris {
                            println!("ref: {}", uri);
                        }
                        println!();
                    }
                    SearchItem::Done => break,
                }
            }
            info!("{} entries returned", count);
            Ok(())
        }
        Command::Add { dn, file } => {
            let attrs = load_table(&file)?;
            report("add", conn.add(&dn, &attrs)?)
        }
        Command::Modify { dn, file } => {
            let groups = load_groups(&file)?;
            report("modify", conn.modify(&dn, &groups)?)
        }
        Command::Delete { dn } => report("delete", conn.delete(&dn)?),
        Command::Compare { dn, attribute, value } => {
            let matched = conn.compare(&dn, &attribute, value.as_bytes())?.wait()?;
            println!("{}", if matched { "TRUE" } else { "FALSE" });
            Ok(())
        }
        Command::Rename { dn, new_rdn, new_parent, delete_old_rdn } => {
            let options = RenameOptions {
                new_parent: new_parent.as_deref(),
                delete_old_rdn,
            };
            report("rename", conn.rename(&dn, &new_rdn, options)?)
        }
    }
}

fn report(verb: &str, op: PendingOperation) -> Result<()> {
    let id = op.message_id();
    op.wait().with_context(|| format!("{} failed (msgid {})", verb, id))?;
    info!("{} succeeded", verb);
    Ok(())
}

fn print_attribute(name: &str, value: &AttributeValue<'_>) {
    let values = value.values();
    if values.is_empty() {
        println!("{}:", name);
    }
    for v in values {
        match std::str::from_utf8(v) {
            Ok(s) => println!("{}: {}", name, s),
            Err(_) => println!("{}:: <{} bytes>", name, v.len()),
        }
    }
}

fn load_yaml(path: &Path) -> Result<serde_yaml::Value> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Read {:?}", path))?;
    serde_yaml::from_str(&content).with_context(|| format!("Parse YAML {:?}", path))
}

fn load_table(path: &Path) -> Result<Table> {
    table_from_yaml(load_yaml(path)?)
}

fn load_groups(path: &Path) -> Result<Vec<Table>> {
    groups_from_yaml(load_yaml(path)?)
}

fn table_from_yaml(node: serde_yaml::Value) -> Result<Table> {
    match Value::from_yaml(node) {
        Some(Value::Table(table)) => Ok(table),
        None => Ok(Table::new()),
        Some(other) => anyhow::bail!("Expected a mapping of attributes, found a {}", other.kind_name()),
    }
}

/// Each list item is either `{op: "+", attrs: {...}}` or a raw table with the sigil under key 1.
fn groups_from_yaml(node: serde_yaml::Value) -> Result<Vec<Table>> {
    let items = match node {
        serde_yaml::Value::Sequence(items) => items,
        _ => anyhow::bail!("Expected a list of modification groups"),
    };
    let mut groups = Vec::with_capacity(items.len());
    for item in items {
        let op = item.get("op").and_then(|v| v.as_str()).map(str::to_string);
        let group = match op {
            Some(op) => {
                let attrs = item.get("attrs").cloned().unwrap_or(serde_yaml::Value::Null);
                table_from_yaml(attrs)?
                    .iter()
                    .fold(Table::new().push(op), |mut t, (k, v)| {
                        t.insert(k.clone(), v.clone());
                        t
                    })
            }
            None => table_from_yaml(item)?,
        };
        groups.push(group);
    }
    Ok(groups)
}
