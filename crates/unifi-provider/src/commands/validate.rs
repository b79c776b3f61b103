use unifi_provider_core::{Plan, SchemaRegistry, StateStore};

use crate::cli::{GlobalOpts, ResourceArgs};
use crate::error::CliError;
use crate::output;
use crate::resources;

/// Types, required attributes, references and cycles, all offline.
pub fn handle(args: &ResourceArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let specs = resources::load(&args.file)?;
    let count = specs.len();
    Plan::offline(&SchemaRegistry::builtin(), specs, &StateStore::new())?;

    output::print_output(
        &format!("{} is valid ({count} resources).", args.file.display()),
        global.quiet,
    );
    Ok(())
}
