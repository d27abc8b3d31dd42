use std::path::PathBuf;
use std::process;
use std::rc::Rc;

use clap::{Parser, Subcommand};
use ferros_expr::ast::{dump, AstContext, DeclId, DeclName, ExternalAstSource};
use ferros_expr::{ExprError, ExprResult, ExternalDeclSource, SourceConfig, Target};
use ferros_utils::{info, init_logging, warn, LogLevel, LoggingConfig};

/// Resolve declarations across the debug info of several object files.
#[derive(Parser, Debug)]
#[command(name = "ferros")]
#[command(version)]
#[command(about = "Resolve declarations across the debug info of several object files", long_about = None)]
struct Cli
{
    /// Log level (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// List the images loaded from the given object files
    Images
    {
        /// Object file carrying DWARF debug info (repeatable)
        #[arg(short, long = "object", required = true)]
        objects: Vec<PathBuf>,
    },
    /// Look up (possibly `::`-qualified) names in order, as an expression would
    Lookup
    {
        /// Names to resolve, e.g. `'$x' geo::Point`
        #[arg(required = true)]
        names: Vec<String>,
        /// Object file carrying DWARF debug info (repeatable, searched in order)
        #[arg(short, long = "object", required = true)]
        objects: Vec<PathBuf>,
        /// Treat the last component of each name as an Objective-C selector
        #[arg(long, default_value_t = false)]
        selector: bool,
        /// Search right away instead of waiting for a `$` name
        #[arg(long, default_value_t = false)]
        eager: bool,
    },
    /// Look up a type and print it with all of its members imported
    Complete
    {
        /// Type to complete, e.g. `geo::Point`
        name: String,
        /// Object file carrying DWARF debug info (repeatable, searched in order)
        #[arg(short, long = "object", required = true)]
        objects: Vec<PathBuf>,
    },
}

fn main()
{
    let cli = Cli::parse();

    let config = LoggingConfig::from_env().with_level(cli.log_level);
    let _guard = match init_logging(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run_command(cli.command) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Commands) -> ExprResult<()>
{
    match command {
        Commands::Images { objects } => {
            let target = load_target(&objects)?;
            let store = target.store();
            for image in target.images().iter() {
                let decls = store.with(image.ast(), AstContext::len)?;
                println!("{}  {}  ({} declarations read)", image.id(), image.name(), decls);
            }
            Ok(())
        }
        Commands::Lookup {
            names,
            objects,
            selector,
            eager,
        } => {
            let target = load_target(&objects)?;
            let source = target.create_expression_source(SourceConfig {
                lookups_enabled: eager,
                ..SourceConfig::default()
            })?;
            for name in &names {
                if name.starts_with(source.config().sigil) {
                    // Never in debug info; only opens the gate.
                    source.find_external_visible_decls_by_name(DeclId::TRANSLATION_UNIT, &DeclName::identifier(name));
                    continue;
                }
                let found = resolve(&source, name, selector)?;
                print_found(&source, &found, false)?;
            }
            Ok(())
        }
        Commands::Complete { name, objects } => {
            let target = load_target(&objects)?;
            let source = target.create_expression_source(SourceConfig {
                lookups_enabled: true,
                ..SourceConfig::default()
            })?;
            let found = resolve(&source, &name, false)?;
            for decl in &found {
                if !source.complete_type(*decl) {
                    warn!(%name, "declaration could not be completed");
                }
            }
            print_found(&source, &found, true)
        }
    }
}

fn load_target(objects: &[PathBuf]) -> ExprResult<Rc<Target>>
{
    let target = Target::new();
    for path in objects {
        target.load_image(path)?;
    }
    info!(images = objects.len(), "target ready");
    Ok(target)
}

/// Walk `name` one `::` component at a time, each looked up inside every
/// declaration the previous component resolved to.
fn resolve(source: &ExternalDeclSource, name: &str, selector: bool) -> ExprResult<Vec<DeclId>>
{
    let components: Vec<&str> = name.split("::").collect();
    if components.iter().any(|component| component.is_empty()) {
        return Err(ExprError::InvalidArgument(format!("Malformed name: {name}")));
    }

    let mut contexts = vec![DeclId::TRANSLATION_UNIT];
    for (index, component) in components.iter().enumerate() {
        let last = index + 1 == components.len();
        let name = if last && selector {
            DeclName::selector(component)
        } else {
            DeclName::identifier(*component)
        };
        contexts = contexts
            .iter()
            .flat_map(|ctx| source.find_external_visible_decls_by_name(*ctx, &name))
            .collect();
        if contexts.is_empty() {
            return Err(ExprError::NotFound(components[..=index].join("::")));
        }
    }
    Ok(contexts)
}

fn print_found(source: &ExternalDeclSource, found: &[DeclId], members: bool) -> ExprResult<()>
{
    source.target().store().with(source.ast(), |ast| {
        for decl in found {
            if members {
                print!("{}", dump::dump(ast, *decl));
            } else {
                println!("{}", dump::summary(ast, *decl));
            }
        }
    })
}
