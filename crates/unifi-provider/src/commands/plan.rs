use unifi_provider_core::{Plan, SchemaRegistry};

use crate::cli::{GlobalOpts, PlanArgs};
use crate::error::CliError;
use crate::output;
use crate::{resources, state_file};

pub async fn handle(args: PlanArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let specs = resources::load(&args.resources.file)?;
    let store = state_file::load(&args.state.state)?;

    let plan = if args.no_refresh {
        Plan::offline(&SchemaRegistry::builtin(), specs, &store)?
    } else {
        let reconciler = super::connect(global).await?;
        let cancel = super::cancel_on_interrupt();
        reconciler.plan(&store, specs, &cancel).await?
    };

    let color = output::should_color(&global.color);
    output::print_output(
        &output::render_plan(&global.output, &plan.changes, color),
        global.quiet,
    );
    Ok(())
}
