//! QPlot runtime CLI
//!
//! Debug and introspection commands over the runtime core.

use clap::{Parser, Subcommand};

use qplot::runtime::context::dump_namespace;
use qplot::runtime::dict::Dict;

#[derive(Parser)]
#[command(name = "qplot", version, about = "QPlot scripting runtime core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Populate the builtin namespaces and dump every binding in sorted
    /// order
    Builtins {
        /// Emit JSON instead of plain text
        #[arg(long)]
        json: bool,
    },
    /// Print the 32-bit symbol hash of a key (debug)
    Hash {
        /// Key to hash
        key: String,
    },
    /// List the registered magic-name patterns (debug)
    Wildcards,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Builtins { json } => dump_builtins(json),
        Command::Hash { key } => {
            println!("{}", Dict::hash(&key));
            Ok(())
        }
        Command::Wildcards => dump_wildcards(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn dump_builtins(json: bool) -> qplot::Result<()> {
    let ns = qplot::builtins::default_namespace()?;
    let bindings = dump_namespace(&ns);

    if json {
        match serde_json::to_string_pretty(&bindings) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                return Err(qplot::RuntimeError::io_error(e.to_string()));
            }
        }
    } else {
        for b in &bindings {
            println!("{:24} {:12} {}", b.name, b.kind, b.value);
        }
        println!("{} bindings", bindings.len());
    }
    Ok(())
}

fn dump_wildcards() -> qplot::Result<()> {
    let w = qplot::builtins::default_wildcards()?;
    let table = w.table().borrow();
    for (pattern, value) in table.iter() {
        println!("{:16} {}", pattern, value.borrow());
    }
    Ok(())
}
