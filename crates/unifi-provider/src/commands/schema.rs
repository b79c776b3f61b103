use unifi_provider_core::{Schema, SchemaRegistry};

use crate::cli::{GlobalOpts, SchemaArgs};
use crate::error::CliError;
use crate::output;

pub fn handle(args: &SchemaArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let registry = SchemaRegistry::builtin();

    let rendered = match &args.kind {
        Some(name) => output::render_schema(&global.output, registry.describe_name(name)?),
        None => {
            let schemas: Vec<Schema> = registry.schemas().cloned().collect();
            output::render_schemas(&global.output, &schemas)
        }
    };
    output::print_output(&rendered, global.quiet);
    Ok(())
}
